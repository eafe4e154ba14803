//! Core data structures for the code graph

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Free-form node/edge attributes. Ordered so persisted output is stable.
pub type Metadata = BTreeMap<String, String>;

/// Unique, stable identifier for a node.
///
/// Directories and files are keyed by their root-relative path (`pkg/a.py`);
/// classes and functions by `<file path>::<qualified name>` (`pkg/a.py::Foo.bar`).
/// Identical trees therefore always produce identical ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Id of a directory or file node.
    pub fn for_path(rel_path: &str) -> Self {
        NodeId(rel_path.to_string())
    }

    /// Id of a class or function defined in `file_path`.
    pub fn for_symbol(file_path: &str, qualified_name: &str) -> Self {
        NodeId(format!("{file_path}::{qualified_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    // ── Structural ──────────────────────────────────────────
    Directory,
    File,

    // ── Code entities (tree-sitter extracted) ───────────────
    Class,
    Function,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Directory,
        NodeKind::File,
        NodeKind::Class,
        NodeKind::Function,
    ];

    /// Directories and files come from the walk, not from source analysis.
    pub fn is_structural(self) -> bool {
        matches!(self, NodeKind::Directory | NodeKind::File)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Directory => "directory",
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    // ── Hierarchy (always a forest) ─────────────────────────
    Contains,

    // ── Relations (cycles allowed) ──────────────────────────
    Inherits,
    Invokes,
    Imports,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 4] = [
        EdgeKind::Contains,
        EdgeKind::Inherits,
        EdgeKind::Invokes,
        EdgeKind::Imports,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Contains => "contains",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Invokes => "invokes",
            EdgeKind::Imports => "imports",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A single node in the code graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Root-relative path. For classes and functions this is the defining file.
    pub path: Option<PathBuf>,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
    pub metadata: Metadata,
}

impl CodeNode {
    pub fn directory(rel_path: &str) -> Self {
        Self::structural(NodeKind::Directory, rel_path)
    }

    pub fn file(rel_path: &str) -> Self {
        Self::structural(NodeKind::File, rel_path)
    }

    fn structural(kind: NodeKind, rel_path: &str) -> Self {
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path).to_string();
        CodeNode {
            id: NodeId::for_path(rel_path),
            name,
            kind,
            path: Some(PathBuf::from(rel_path)),
            line_start: None,
            line_end: None,
            metadata: Metadata::new(),
        }
    }

    /// A class or function node. `id` is supplied by the caller because
    /// duplicate definitions within one file need disambiguation.
    pub fn symbol(
        id: NodeId,
        kind: NodeKind,
        name: impl Into<String>,
        file_path: &str,
        line_start: u32,
        line_end: u32,
    ) -> Self {
        CodeNode {
            id,
            name: name.into(),
            kind,
            path: Some(PathBuf::from(file_path)),
            line_start: Some(line_start),
            line_end: Some(line_end),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The path rendered with `/` separators, if any.
    pub fn path_str(&self) -> Option<String> {
        self.path.as_deref().map(path_key)
    }
}

/// A directed edge in the code graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub metadata: Metadata,
}

impl CodeEdge {
    pub fn new(source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        CodeEdge {
            source,
            target,
            kind,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Render a relative path with `/` separators, dropping `.` components.
pub fn path_key(path: &Path) -> String {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => parts.push("..".to_string()),
            _ => {}
        }
    }
    parts.join("/")
}
