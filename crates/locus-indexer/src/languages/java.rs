//! Java language extractor

use crate::extractor::{
    FileOutline, ImportKind, LanguageExtractor, OutlineBuilder, header_signature, last_segment,
    leading_comment,
};
use locus_core::NodeKind;
use tree_sitter::Node;

pub struct JavaExtractor;

impl LanguageExtractor for JavaExtractor {
    fn extract(&self, root: Node<'_>, source: &[u8]) -> FileOutline {
        let mut builder = OutlineBuilder::new(source);
        visit(&mut builder, root, source);
        builder.finish()
    }
}

fn visit(b: &mut OutlineBuilder<'_>, node: Node<'_>, source: &[u8]) {
    match node.kind() {
        "class_declaration" | "interface_declaration" | "enum_declaration"
        | "record_declaration" => class(b, node, source),
        "method_declaration" | "constructor_declaration" => method(b, node, source),
        "method_invocation" => {
            if let Some(name) = b.field_text(node, "name") {
                b.call(name);
            }
            recurse(b, node, source);
        }
        "object_creation_expression" => {
            if let Some(ty) = b.field_text(node, "type") {
                b.call(last_segment(ty));
            }
            recurse(b, node, source);
        }
        "import_declaration" => {
            let mut cursor = node.walk();
            let path = node
                .named_children(&mut cursor)
                .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
                .map(|c| b.text(c).to_string());
            if let Some(path) = path {
                b.import(path, ImportKind::Module { level: 0 }, Vec::new());
            }
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
    if let Some(superclass) = node.child_by_field_name("superclass") {
        if let Some(ty) = superclass.named_child(0) {
            bases.push(last_segment(b.text(ty)).to_string());
        }
    }
    // interfaces extending other interfaces
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "extends_interfaces" {
            let mut inner = child.walk();
            for list in child.named_children(&mut inner) {
                let mut types = list.walk();
                for ty in list.named_children(&mut types) {
                    bases.push(last_segment(b.text(ty)).to_string());
                }
            }
        }
    }

    let body = node.child_by_field_name("body");
    let symbol = b.symbol_mut(idx);
    symbol.bases = bases;
    symbol.signature = Some(header_signature(node.utf8_text(source).unwrap_or_default()));
    symbol.docstring = leading_comment(node, source);

    if let Some(body) = body {
        b.within(idx, |b| recurse(b, body, source));
    }
}

fn method(b: &mut OutlineBuilder<'_>, node: Node<'_>, source: &[u8]) {
    let Some(name) = b.field_text(node, "name") else {
        return recurse(b, node, source);
    };
    let idx = b.open(NodeKind::Function, name, node);

    let args = node
        .child_by_field_name("parameters")
        .map(|params| {
            let mut cursor = params.walk();
            params
                .named_children(&mut cursor)
                .filter_map(|p| p.child_by_field_name("name").map(|n| b.text(n).to_string()))
                .collect()
        })
        .unwrap_or_default();

    let body = node.child_by_field_name("body");
    let symbol = b.symbol_mut(idx);
    symbol.args = args;
    symbol.signature = Some(header_signature(node.utf8_text(source).unwrap_or_default()));
    symbol.docstring = leading_comment(node, source);

    if let Some(body) = body {
        b.within(idx, |b| recurse(b, body, source));
    }
}
