//! Python language extractor using tree-sitter

use crate::extractor::{FileOutline, ImportKind, LanguageExtractor, OutlineBuilder, last_segment, unquote};
use locus_core::NodeKind;
use tree_sitter::Node;

pub struct PythonExtractor;

impl LanguageExtractor for PythonExtractor {
    fn extract(&self, root: Node<'_>, source: &[u8]) -> FileOutline {
        let mut builder = OutlineBuilder::new(source);
        visit(&mut builder, root);
        builder.finish()
    }
}

fn visit(b: &mut OutlineBuilder<'_>, node: Node<'_>) {
    match node.kind() {
        "class_definition" => class(b, node),
        "function_definition" => function(b, node),
        "call" => {
            if let Some(callee) = node.child_by_field_name("function") {
                let name = match callee.kind() {
                    "attribute" => b.field_text(callee, "attribute").unwrap_or_default(),
                    "identifier" => b.text(callee),
                    _ => "",
                };
                b.call(name);
            }
            b.each_child(node, visit);
        }
        "import_statement" => {
            b.each_child(node, |b, child| {
                let module = match child.kind() {
                    "dotted_name" => Some(b.text(child)),
                    "aliased_import" => b.field_text(child, "name"),
                    _ => None,
                };
                if let Some(module) = module {
                    b.import(module, ImportKind::Module { level: 0 }, Vec::new());
                }
            });
        }
        "import_from_statement" => import_from(b, node),
        _ => b.each_child(node, visit),
    }
}

fn class(b: &mut OutlineBuilder<'_>, node: Node<'_>) {
    let Some(name) = b.field_text(node, "name") else {
        return;
    };
    let idx = b.open(NodeKind::Class, name, node);

    let mut bases = Vec::new();
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for arg in superclasses.named_children(&mut cursor) {
            // metaclass=... and friends are not bases
            if matches!(arg.kind(), "identifier" | "attribute") {
                bases.push(last_segment(b.text(arg)).to_string());
            }
        }
    }
    let body = node.child_by_field_name("body");
    let docstring = body.and_then(|body| docstring(b, body));

    let symbol = b.symbol_mut(idx);
    symbol.signature = Some(match bases.is_empty() {
        true => format!("class {name}"),
        false => format!("class {name}({})", bases.join(", ")),
    });
    symbol.bases = bases;
    symbol.docstring = docstring;

    if let Some(body) = body {
        b.within(idx, |b| b.each_child(body, visit));
    }
}

fn function(b: &mut OutlineBuilder<'_>, node: Node<'_>) {
    let Some(name) = b.field_text(node, "name") else {
        return;
    };
    let idx = b.open(NodeKind::Function, name, node);

    let params = node.child_by_field_name("parameters");
    let args: Vec<String> = params
        .map(|params| {
            let mut cursor = params.walk();
            params
                .named_children(&mut cursor)
                .filter(|p| p.kind() != "comment")
                .map(|p| parameter_name(b.text(p)))
                .filter(|arg| !arg.is_empty() && arg != "*" && arg != "/")
                .collect()
        })
        .unwrap_or_default();
    let mut signature = format!("def {name}{}", params.map(|p| b.text(p)).unwrap_or("()"));
    if let Some(ret) = b.field_text(node, "return_type") {
        signature.push_str(" -> ");
        signature.push_str(ret);
    }
    let body = node.child_by_field_name("body");
    let docstring = body.and_then(|body| docstring(b, body));

    let symbol = b.symbol_mut(idx);
    symbol.args = args;
    symbol.signature = Some(signature.split_whitespace().collect::<Vec<_>>().join(" "));
    symbol.docstring = docstring;

    if let Some(body) = body {
        b.within(idx, |b| b.each_child(body, visit));
    }
}

/// `x: int = 3` -> `x`, `*args` -> `*args`
fn parameter_name(text: &str) -> String {
    text.split([':', '='])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// First statement of a block, if it is a bare string literal.
fn docstring(b: &OutlineBuilder<'_>, body: Node<'_>) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    let text = unquote(b.text(literal));
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn import_from(b: &mut OutlineBuilder<'_>, node: Node<'_>) {
    let Some(module) = node.child_by_field_name("module_name") else {
        return;
    };
    let (level, spec) = match module.kind() {
        "relative_import" => {
            let text = b.text(module);
            let level = text.chars().take_while(|&c| c == '.').count();
            (level, text[level..].trim().to_string())
        }
        _ => (0, b.text(module).to_string()),
    };

    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children_by_field_name("name", &mut cursor) {
        let name = match child.kind() {
            "aliased_import" => b.field_text(child, "name").unwrap_or_default(),
            _ => b.text(child),
        };
        if !name.is_empty() {
            names.push(name.to_string());
        }
    }
    b.import(spec, ImportKind::Module { level }, names);
}
