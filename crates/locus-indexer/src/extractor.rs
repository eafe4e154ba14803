//! Language extractor trait and the per-file outline it produces

use locus_core::NodeKind;
use tree_sitter::Node;

/// A class or function found in one file.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolDef {
    pub kind: NodeKind,
    pub name: String,
    /// Dotted path through enclosing symbols, e.g. `Foo.bar`.
    pub qualified_name: String,
    /// Index of the enclosing symbol in [`FileOutline::symbols`].
    pub parent: Option<usize>,
    pub line_start: u32,
    pub line_end: u32,
    pub docstring: Option<String>,
    pub signature: Option<String>,
    pub args: Vec<String>,
    /// Declared base class names, unresolved.
    pub bases: Vec<String>,
    /// Names of things this function calls or instantiates, unresolved.
    pub calls: Vec<String>,
}

/// How an import names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// Dotted module path (`a.b.c`). `level` counts leading dots of a relative import.
    Module { level: usize },
    /// Path relative to the importing file (`./util`), without extension.
    Script,
    /// `#include "x.h"`: relative to the file, then anywhere in the tree.
    Include,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub spec: String,
    pub kind: ImportKind,
    /// `from spec import a, b`: names that may themselves be modules.
    pub names: Vec<String>,
}

/// Everything one file contributes before cross-file resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileOutline {
    pub symbols: Vec<SymbolDef>,
    pub imports: Vec<ImportRef>,
}

pub trait LanguageExtractor: Send + Sync {
    /// Walk a parsed tree and collect its outline.
    fn extract(&self, root: Node<'_>, source: &[u8]) -> FileOutline;
}

/// Incremental outline construction with a scope stack.
pub(crate) struct OutlineBuilder<'s> {
    source: &'s [u8],
    outline: FileOutline,
    scope: Vec<usize>,
}

impl<'s> OutlineBuilder<'s> {
    pub fn new(source: &'s [u8]) -> Self {
        OutlineBuilder {
            source,
            outline: FileOutline::default(),
            scope: Vec::new(),
        }
    }

    pub fn finish(self) -> FileOutline {
        self.outline
    }

    pub fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.source).unwrap_or_default()
    }

    pub fn field_text(&self, node: Node<'_>, field: &str) -> Option<&'s str> {
        node.child_by_field_name(field).map(|child| self.text(child))
    }

    /// Register a symbol spanning `node` under the current scope.
    pub fn open(&mut self, kind: NodeKind, name: &str, node: Node<'_>) -> usize {
        let parent = self.scope.last().copied();
        let qualified_name = match parent {
            Some(idx) => format!("{}.{}", self.outline.symbols[idx].qualified_name, name),
            None => name.to_string(),
        };
        self.outline.symbols.push(SymbolDef {
            kind,
            name: name.to_string(),
            qualified_name,
            parent,
            line_start: line_of(node.start_position().row),
            line_end: line_of(node.end_position().row),
            docstring: None,
            signature: None,
            args: Vec::new(),
            bases: Vec::new(),
            calls: Vec::new(),
        });
        self.outline.symbols.len() - 1
    }

    pub fn symbol_mut(&mut self, idx: usize) -> &mut SymbolDef {
        &mut self.outline.symbols[idx]
    }

    /// Run `body` with `idx` as the innermost scope.
    pub fn within(&mut self, idx: usize, body: impl FnOnce(&mut Self)) {
        self.scope.push(idx);
        body(self);
        self.scope.pop();
    }

    /// Attribute a call to the innermost enclosing function, if any.
    pub fn call(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        let owner = self
            .scope
            .iter()
            .rev()
            .copied()
            .find(|&idx| self.outline.symbols[idx].kind == NodeKind::Function);
        if let Some(idx) = owner {
            let calls = &mut self.outline.symbols[idx].calls;
            if !calls.iter().any(|c| c == name) {
                calls.push(name.to_string());
            }
        }
    }

    pub fn import(&mut self, spec: impl Into<String>, kind: ImportKind, names: Vec<String>) {
        let spec = spec.into();
        if spec.is_empty() && names.is_empty() {
            return;
        }
        self.outline.imports.push(ImportRef { spec, kind, names });
    }

    /// Recurse into every named child.
    pub fn each_child(&mut self, node: Node<'_>, mut visit: impl FnMut(&mut Self, Node<'_>)) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            visit(self, child);
        }
    }
}

fn line_of(row: usize) -> u32 {
    u32::try_from(row).unwrap_or(u32::MAX - 1) + 1
}

/// Last segment of a dotted or scoped name: `a.b.C` or `a::C` gives `C`.
pub(crate) fn last_segment(name: &str) -> &str {
    let name = name.split(['<', '(']).next().unwrap_or(name).trim();
    name.rsplit(['.', ':']).next().unwrap_or(name).trim()
}

/// Strip quotes and string prefixes from a literal.
pub(crate) fn unquote(literal: &str) -> String {
    let trimmed = literal.trim();
    let body = trimmed.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let body = ["\"\"\"", "'''", "\"", "'", "`"]
        .iter()
        .find_map(|q| {
            body.strip_prefix(q)
                .and_then(|rest| rest.strip_suffix(q).or(Some(rest)))
        })
        .unwrap_or(body);
    body.trim().to_string()
}

/// Text from the node start to the opening brace (or first line), whitespace collapsed.
pub(crate) fn header_signature(text: &str) -> String {
    let end = text.find('{').unwrap_or(text.len());
    let head = text[..end].lines().take(4).collect::<Vec<_>>().join(" ");
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A `/** ... */` or `//` comment directly above `node`, cleaned up.
pub(crate) fn leading_comment(node: Node<'_>, source: &[u8]) -> Option<String> {
    let mut anchor = node;
    while let Some(parent) = anchor.parent() {
        if matches!(parent.kind(), "export_statement" | "template_declaration") {
            anchor = parent;
        } else {
            break;
        }
    }
    let comment = anchor.prev_named_sibling()?;
    if !comment.kind().contains("comment") {
        return None;
    }
    if anchor.start_position().row > comment.end_position().row + 1 {
        return None;
    }
    let raw = comment.utf8_text(source).ok()?;
    let cleaned: Vec<&str> = raw
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches("/**")
                .trim_start_matches("/*")
                .trim_end_matches("*/")
                .trim_start_matches("//")
                .trim_start_matches('*')
                .trim()
        })
        .filter(|line| !line.is_empty())
        .collect();
    (!cleaned.is_empty()).then(|| cleaned.join(" "))
}

/// 1-based line of the first syntax error, if the tree has one.
pub(crate) fn first_error_line(node: Node<'_>) -> Option<u32> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(line_of(node.start_position().row));
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(first_error_line)
        .or(Some(line_of(node.start_position().row)))
}
