//! C and C++ extractor

use crate::extractor::{
    FileOutline, ImportKind, LanguageExtractor, OutlineBuilder, header_signature, last_segment,
    leading_comment, unquote,
};
use locus_core::NodeKind;
use tree_sitter::Node;

/// Functions, `#include`s and calls for C; C++ adds classes and structs
/// with base clauses and in-class methods.
pub struct CExtractor {
    pub cpp: bool,
}

impl LanguageExtractor for CExtractor {
    fn extract(&self, root: Node<'_>, source: &[u8]) -> FileOutline {
        let mut builder = OutlineBuilder::new(source);
        let mut walker = Walker { cpp: self.cpp, source };
        walker.visit(&mut builder, root);
        builder.finish()
    }
}

struct Walker<'s> {
    cpp: bool,
    source: &'s [u8],
}

impl Walker<'_> {
    fn visit(&mut self, b: &mut OutlineBuilder<'_>, node: Node<'_>) {
        match node.kind() {
            "function_definition" => self.function(b, node),
            "class_specifier" | "struct_specifier" if self.cpp => self.class(b, node),
            "call_expression" => {
                if let Some(callee) = node.child_by_field_name("function") {
                    let name = match callee.kind() {
                        "identifier" => b.text(callee),
                        "field_expression" => b.field_text(callee, "field").unwrap_or_default(),
                        "qualified_identifier" | "template_function" => {
                            last_segment(b.text(callee))
                        }
                        _ => "",
                    };
                    b.call(name);
                }
                self.recurse(b, node);
            }
            "new_expression" => {
                if let Some(ty) = b.field_text(node, "type") {
                    b.call(last_segment(ty));
                }
                self.recurse(b, node);
            }
            "preproc_include" => {
                if let Some(path) = node
                    .child_by_field_name("path")
                    .filter(|p| p.kind() == "string_literal")
                {
                    let spec = unquote(b.text(path));
                    b.import(spec, ImportKind::Include, Vec::new());
                }
            }
            _ => self.recurse(b, node),
        }
    }

    fn recurse(&mut self, b: &mut OutlineBuilder<'_>, node: Node<'_>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(b, child);
        }
    }

    fn function(&mut self, b: &mut OutlineBuilder<'_>, node: Node<'_>) {
        let Some(declarator) = node
            .child_by_field_name("declarator")
            .and_then(find_function_declarator)
        else {
            return self.recurse(b, node);
        };
        let Some(name_node) = declarator.child_by_field_name("declarator") else {
            return self.recurse(b, node);
        };
        let name = last_segment(b.text(name_node));
        if name.is_empty() {
            return self.recurse(b, node);
        }
        let idx = b.open(NodeKind::Function, name, node);

        let args = declarator
            .child_by_field_name("parameters")
            .map(|params| {
                let mut cursor = params.walk();
                params
                    .named_children(&mut cursor)
                    .filter_map(|p| p.child_by_field_name("declarator"))
                    .map(|d| declarator_name(b.text(d)))
                    .filter(|arg| !arg.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let body = node.child_by_field_name("body");
        let symbol = b.symbol_mut(idx);
        symbol.args = args;
        symbol.signature = Some(header_signature(
            node.utf8_text(self.source).unwrap_or_default(),
        ));
        symbol.docstring = leading_comment(node, self.source);

        if let Some(body) = body {
            b.within(idx, |b| self.recurse(b, body));
        }
    }

    fn class(&mut self, b: &mut OutlineBuilder<'_>, node: Node<'_>) {
        // forward declarations have no body
        let (Some(name), Some(body)) = (
            b.field_text(node, "name"),
            node.child_by_field_name("body"),
        ) else {
            return self.recurse(b, node);
        };
        let idx = b.open(NodeKind::Class, last_segment(name), node);

        let mut bases = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "base_class_clause" {
                continue;
            }
            let mut inner = child.walk();
            for base in child.named_children(&mut inner) {
                if matches!(
                    base.kind(),
                    "type_identifier" | "qualified_identifier" | "template_type"
                ) {
                    bases.push(last_segment(b.text(base)).to_string());
                }
            }
        }

        let symbol = b.symbol_mut(idx);
        symbol.bases = bases;
        symbol.signature = Some(header_signature(
            node.utf8_text(self.source).unwrap_or_default(),
        ));
        symbol.docstring = leading_comment(node, self.source);

        b.within(idx, |b| self.recurse(b, body));
    }
}

/// Unwrap pointer/reference declarators down to the function declarator.
fn find_function_declarator(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node;
    loop {
        if current.kind() == "function_declarator" {
            return Some(current);
        }
        current = current.child_by_field_name("declarator")?;
    }
}

/// `*argv[]` -> `argv`, `&out` -> `out`
fn declarator_name(text: &str) -> String {
    text.trim_start_matches(['*', '&', ' '])
        .split(['[', ' ', '='])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
