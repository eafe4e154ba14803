//! JavaScript / TypeScript / TSX extractor
//!
//! The three grammars share their class, function, call and import node
//! kinds, so one walker serves all of them.

use crate::extractor::{
    FileOutline, ImportKind, LanguageExtractor, OutlineBuilder, header_signature, last_segment,
    leading_comment, unquote,
};
use locus_core::NodeKind;
use tree_sitter::Node;

pub struct JavaScriptExtractor;

impl LanguageExtractor for JavaScriptExtractor {
    fn extract(&self, root: Node<'_>, source: &[u8]) -> FileOutline {
        let mut builder = OutlineBuilder::new(source);
        visit(&mut builder, root, source);
        builder.finish()
    }
}

fn visit(b: &mut OutlineBuilder<'_>, node: Node<'_>, source: &[u8]) {
    match node.kind() {
        "class_declaration" | "class" | "abstract_class_declaration" => class(b, node, source),
        "function_declaration" | "generator_function_declaration" | "method_definition" => {
            match b.field_text(node, "name") {
                Some(name) => function(b, node, name, source),
                None => recurse(b, node, source),
            }
        }
        "variable_declarator" => {
            let is_function = node.child_by_field_name("value").is_some_and(|value| {
                matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "function" | "generator_function"
                )
            });
            let name = node
                .child_by_field_name("name")
                .filter(|n| n.kind() == "identifier")
                .map(|n| b.text(n));
            match (is_function, name) {
                (true, Some(name)) => function(b, node, name, source),
                _ => recurse(b, node, source),
            }
        }
        "call_expression" => {
            if let Some(callee) = node.child_by_field_name("function") {
                match callee.kind() {
                    "identifier" if b.text(callee) == "require" => require(b, node),
                    "identifier" => b.call(b.text(callee)),
                    "member_expression" => {
                        let property = b.field_text(callee, "property").unwrap_or_default();
                        b.call(property);
                    }
                    _ => {}
                }
            }
            recurse(b, node, source);
        }
        "new_expression" => {
            if let Some(ctor) = node.child_by_field_name("constructor") {
                b.call(last_segment(b.text(ctor)));
            }
            recurse(b, node, source);
        }
        "import_statement" => {
            if let Some(spec) = b.field_text(node, "source") {
                let spec = unquote(spec);
                b.import(spec, ImportKind::Script, Vec::new());
            }
        }
        "export_statement" => {
            // `export { x } from './y'`
            if let Some(spec) = b.field_text(node, "source") {
                let spec = unquote(spec);
                b.import(spec, ImportKind::Script, Vec::new());
            }
            recurse(b, node, source);
        }
        _ => recurse(b, node, source),
    }
}

fn recurse(b: &mut OutlineBuilder<'_>, node: Node<'_>, source: &[u8]) {
    b.each_child(node, |b, child| visit(b, child, source));
}

fn class(b: &mut OutlineBuilder<'_>, node: Node<'_>, source: &[u8]) {
    let Some(name) = b.field_text(node, "name") else {
        return recurse(b, node, source);
    };
    let idx = b.open(NodeKind::Class, name, node);

    let mut bases = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "class_heritage" {
            continue;
        }
        let mut inner = child.walk();
        for clause in child.named_children(&mut inner) {
            match clause.kind() {
                // TypeScript wraps the expression in an extends clause
                "extends_clause" => {
                    if let Some(value) = clause.child_by_field_name("value") {
                        bases.push(last_segment(b.text(value)).to_string());
                    }
                }
                "implements_clause" => {}
                _ => bases.push(last_segment(b.text(clause)).to_string()),
            }
        }
    }

    let body = node.child_by_field_name("body");
    let symbol = b.symbol_mut(idx);
    symbol.signature = Some(header_signature(
        node.utf8_text(source).unwrap_or_default(),
    ));
    symbol.docstring = leading_comment(node, source);
    symbol.bases = bases;

    if let Some(body) = body {
        b.within(idx, |b| recurse(b, body, source));
    }
}

fn function(b: &mut OutlineBuilder<'_>, node: Node<'_>, name: &str, source: &[u8]) {
    let idx = b.open(NodeKind::Function, name, node);

    // for `const f = () => ...` the parameters live on the value
    let target = node.child_by_field_name("value").unwrap_or(node);
    let args = target
        .child_by_field_name("parameters")
        .map(|params| {
            let mut cursor = params.walk();
            params
                .named_children(&mut cursor)
                .filter(|p| p.kind() != "comment")
                .map(|p| parameter_name(b.text(p)))
                .filter(|arg| !arg.is_empty())
                .collect()
        })
        .or_else(|| {
            // single bare parameter: `x => x + 1`
            target
                .child_by_field_name("parameter")
                .map(|p| vec![b.text(p).to_string()])
        })
        .unwrap_or_default();

    let body = target.child_by_field_name("body");
    let symbol = b.symbol_mut(idx);
    symbol.args = args;
    symbol.signature = Some(header_signature(node.utf8_text(source).unwrap_or_default()));
    symbol.docstring = leading_comment(declaration_anchor(node), source);

    if let Some(body) = body {
        b.within(idx, |b| recurse(b, body, source));
    }
}

/// `const f = ...` sits inside a lexical declaration; comments attach to that.
fn declaration_anchor(node: Node<'_>) -> Node<'_> {
    match node.parent() {
        Some(parent)
            if node.kind() == "variable_declarator"
                && matches!(parent.kind(), "lexical_declaration" | "variable_declaration") =>
        {
            parent
        }
        _ => node,
    }
}

/// `a: string = "x"` -> `a`, `...rest` -> `...rest`
fn parameter_name(text: &str) -> String {
    text.split([':', '=', '?'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn require(b: &mut OutlineBuilder<'_>, call: Node<'_>) {
    let Some(args) = call.child_by_field_name("arguments") else {
        return;
    };
    if let Some(first) = args.named_child(0).filter(|a| a.kind() == "string") {
        let spec = unquote(b.text(first));
        b.import(spec, ImportKind::Script, Vec::new());
    }
}
