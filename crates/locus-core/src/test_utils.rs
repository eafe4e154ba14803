//! Test utilities for Locus

use crate::graph::GraphStore;
use crate::model::*;
use std::fs;
use tempfile::TempDir;

/// Create a repository with a specific file structure
pub fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for (path, content) in structure {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content).unwrap();
    }

    temp_dir
}

/// A small hand-built graph:
///
/// ```text
/// pkg/
///   a.py    class Foo { def run }, def bar     (bar invokes Foo.run)
///   b.py    class Baz(Foo)                     (b.py imports a.py)
/// ```
///
/// Left unfrozen so tests can extend it.
pub fn sample_graph() -> GraphStore {
    let mut store = GraphStore::new();
    let sym = |file: &str, q: &str| NodeId::for_symbol(file, q);

    store.add_node(CodeNode::directory("pkg")).unwrap();
    store
        .add_node(CodeNode::file("pkg/a.py").with_metadata("language", "python"))
        .unwrap();
    store
        .add_node(CodeNode::file("pkg/b.py").with_metadata("language", "python"))
        .unwrap();
    store
        .add_node(
            CodeNode::symbol(sym("pkg/a.py", "Foo"), NodeKind::Class, "Foo", "pkg/a.py", 1, 4)
                .with_metadata("docstring", "Parses configuration files."),
        )
        .unwrap();
    store
        .add_node(
            CodeNode::symbol(sym("pkg/a.py", "Foo.run"), NodeKind::Function, "run", "pkg/a.py", 3, 4)
                .with_metadata("qualified_name", "Foo.run"),
        )
        .unwrap();
    store
        .add_node(
            CodeNode::symbol(sym("pkg/a.py", "bar"), NodeKind::Function, "bar", "pkg/a.py", 6, 7)
                .with_metadata("signature", "def bar(path)"),
        )
        .unwrap();
    store
        .add_node(
            CodeNode::symbol(sym("pkg/b.py", "Baz"), NodeKind::Class, "Baz", "pkg/b.py", 3, 5)
                .with_metadata("bases", "Foo"),
        )
        .unwrap();

    let edges = [
        ("pkg", "pkg/a.py", EdgeKind::Contains),
        ("pkg", "pkg/b.py", EdgeKind::Contains),
        ("pkg/a.py", "pkg/a.py::Foo", EdgeKind::Contains),
        ("pkg/a.py::Foo", "pkg/a.py::Foo.run", EdgeKind::Contains),
        ("pkg/a.py", "pkg/a.py::bar", EdgeKind::Contains),
        ("pkg/b.py", "pkg/b.py::Baz", EdgeKind::Contains),
        ("pkg/b.py::Baz", "pkg/a.py::Foo", EdgeKind::Inherits),
        ("pkg/a.py::bar", "pkg/a.py::Foo.run", EdgeKind::Invokes),
        ("pkg/b.py", "pkg/a.py", EdgeKind::Imports),
    ];
    for (source, target, kind) in edges {
        store
            .add_edge(CodeEdge::new(source.into(), target.into(), kind))
            .unwrap();
    }
    store
}
