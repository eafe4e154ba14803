//! Unit tests for locus-indexer graph construction

use crate::*;
use locus_core::test_utils::create_repo_with_structure;
use locus_core::{Direction, EdgeKind, GraphConfig, GraphStore, NodeId, NodeKind};
use std::collections::HashSet;

fn py_config() -> GraphConfig {
    GraphConfig {
        file_extensions: vec![".py".to_string()],
        max_depth: 10,
        ..GraphConfig::default()
    }
}

fn edge_set(store: &GraphStore, kind: EdgeKind) -> Vec<(String, String)> {
    let mut edges: Vec<_> = store
        .edges()
        .filter(|e| e.kind == kind)
        .map(|e| (e.source.to_string(), e.target.to_string()))
        .collect();
    edges.sort();
    edges
}

fn assert_well_formed(store: &GraphStore) {
    for edge in store.edges() {
        assert!(store.contains(&edge.source), "dangling source {}", edge.source);
        assert!(store.contains(&edge.target), "dangling target {}", edge.target);
    }
    for node in store.nodes() {
        let parents = store.get_edges(&node.id, Some(EdgeKind::Contains), Direction::Incoming);
        assert!(parents.len() <= 1, "{} has {} parents", node.id, parents.len());
        let mut seen = HashSet::new();
        let mut current = node.id.clone();
        while let Some(parent) = store.parent_of(&current) {
            assert!(seen.insert(parent.id.clone()), "contains cycle through {}", node.id);
            current = parent.id.clone();
        }
    }
}

#[test]
fn test_single_package_scenario() {
    let repo = create_repo_with_structure(&[(
        "pkg/a.py",
        "class Foo:\n    pass\n\n\ndef bar():\n    return 1\n",
    )]);
    let out = build(repo.path(), &py_config()).unwrap();
    let graph = &out.graph;
    assert!(out.skipped.is_empty());
    assert!(graph.is_frozen());

    let stats = graph.stats();
    assert_eq!(stats.total_nodes, 4);
    for kind in NodeKind::ALL {
        assert_eq!(stats.node_counts[&kind], 1, "{kind}");
    }
    assert_eq!(
        edge_set(graph, EdgeKind::Contains),
        vec![
            ("pkg".to_string(), "pkg/a.py".to_string()),
            ("pkg/a.py".to_string(), "pkg/a.py::Foo".to_string()),
            ("pkg/a.py".to_string(), "pkg/a.py::bar".to_string()),
        ]
    );
    assert_eq!(stats.max_depth, 2);

    let foo = graph.get_node(&NodeId::from("pkg/a.py::Foo")).unwrap();
    assert_eq!(foo.kind, NodeKind::Class);
    assert_eq!((foo.line_start, foo.line_end), (Some(1), Some(2)));
    let file = graph.get_node(&NodeId::from("pkg/a.py")).unwrap();
    assert_eq!(file.meta("language"), Some("python"));
    assert_eq!(graph.roots().len(), 1);
}

#[test]
fn test_cross_file_relations() {
    let repo = create_repo_with_structure(&[
        (
            "app/models.py",
            "class Base:\n    def save(self):\n        pass\n\nclass User(Base):\n    def save(self):\n        self.validate()\n        super().save()\n\n    def validate(self):\n        pass\n",
        ),
        (
            "app/service.py",
            "from .models import User\nimport os\n\ndef create():\n    user = User()\n    user.save()\n    return missing_function()\n",
        ),
    ]);
    let out = build(repo.path(), &py_config()).unwrap();
    let graph = &out.graph;
    assert_well_formed(graph);

    assert_eq!(
        edge_set(graph, EdgeKind::Imports),
        vec![("app/service.py".to_string(), "app/models.py".to_string())]
    );
    assert_eq!(
        edge_set(graph, EdgeKind::Inherits),
        vec![("app/models.py::User".to_string(), "app/models.py::Base".to_string())]
    );
    let invokes = edge_set(graph, EdgeKind::Invokes);
    // sibling method wins inside User.save; imported file resolves create()'s calls
    assert!(invokes.contains(&(
        "app/models.py::User.save".to_string(),
        "app/models.py::User.validate".to_string()
    )));
    assert!(invokes.contains(&(
        "app/models.py::User.save".to_string(),
        "app/models.py::User.save".to_string()
    )));
    assert!(invokes.contains(&(
        "app/service.py::create".to_string(),
        "app/models.py::User".to_string()
    )));
    assert!(invokes.iter().all(|(_, target)| !target.contains("missing")));

    let user = graph.get_node(&NodeId::from("app/models.py::User")).unwrap();
    assert_eq!(user.meta("bases"), Some("Base"));
    assert_eq!(user.meta("qualified_name"), Some("User"));
}

#[test]
fn test_syntax_errors_are_skipped_not_fatal() {
    let repo = create_repo_with_structure(&[
        ("ok.py", "def fine():\n    pass\n"),
        ("broken.py", "def broken(:\n    pass\n"),
    ]);
    let out = build(repo.path(), &py_config()).unwrap();
    assert_eq!(out.skipped.len(), 1);
    assert_eq!(out.skipped[0].path, "broken.py");
    assert!(out.skipped[0].reason.contains("syntax error"), "{}", out.skipped[0].reason);
    // the file node survives, its contents do not
    assert!(out.graph.contains(&NodeId::from("broken.py")));
    assert!(out.graph.children_of(&NodeId::from("broken.py")).is_empty());
    assert!(out.graph.contains(&NodeId::from("ok.py::fine")));

    let lenient = GraphConfig {
        strict_syntax: false,
        ..py_config()
    };
    let out = build(repo.path(), &lenient).unwrap();
    assert!(out.skipped.is_empty());
}

#[test]
fn test_oversized_and_non_utf8_files() {
    let repo = create_repo_with_structure(&[("big.py", "x = 1\n"), ("small.py", "y = 2\n")]);
    std::fs::write(repo.path().join("big.py"), "# padding\n".repeat(200)).unwrap();
    std::fs::write(repo.path().join("latin.py"), b"name = '\xe9'\n").unwrap();
    let config = GraphConfig {
        max_file_size: 100,
        ..py_config()
    };
    let out = build(repo.path(), &config).unwrap();
    let mut reasons: Vec<_> = out
        .skipped
        .iter()
        .map(|s| (s.path.as_str(), s.reason.split(':').next().unwrap_or_default()))
        .collect();
    reasons.sort();
    assert_eq!(
        reasons,
        vec![("big.py", "file too large"), ("latin.py", "file is not valid UTF-8")]
    );
    assert_eq!(out.graph.nodes_of_kind(NodeKind::File).len(), 3);
}

#[test]
fn test_duplicate_definitions_get_suffixes() {
    let repo = create_repo_with_structure(&[(
        "dup.py",
        "def handler():\n    pass\n\ndef handler():\n    pass\n",
    )]);
    let out = build(repo.path(), &py_config()).unwrap();
    assert!(out.graph.contains(&NodeId::from("dup.py::handler")));
    assert!(out.graph.contains(&NodeId::from("dup.py::handler#2")));
}

#[test]
fn test_disabled_kinds_are_not_emitted() {
    let repo = create_repo_with_structure(&[(
        "m.py",
        "import other\n\nclass A:\n    def go(self):\n        helper()\n\ndef helper():\n    pass\n",
    ), ("other.py", "")]);
    let config = GraphConfig {
        node_types: vec![NodeKind::Directory, NodeKind::File, NodeKind::Function],
        edge_types: vec![EdgeKind::Contains, EdgeKind::Invokes],
        ..py_config()
    };
    let out = build(repo.path(), &config).unwrap();
    let graph = &out.graph;
    assert!(graph.nodes_of_kind(NodeKind::Class).is_empty());
    // the method hangs off the file when its class is not emitted
    assert_eq!(graph.parent_of(&NodeId::from("m.py::A.go")).unwrap().id.as_str(), "m.py");
    assert!(edge_set(graph, EdgeKind::Imports).is_empty());
    assert_eq!(
        edge_set(graph, EdgeKind::Invokes),
        vec![("m.py::A.go".to_string(), "m.py::helper".to_string())]
    );
}

#[test]
fn test_invalid_graph_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = GraphConfig {
        edge_types: vec![EdgeKind::Imports],
        ..GraphConfig::default()
    };
    assert!(matches!(build(dir.path(), &config), Err(BuildError::Config(_))));
    assert!(matches!(
        build(&dir.path().join("missing"), &GraphConfig::default()),
        Err(BuildError::RootNotFound(_))
    ));
    let file = dir.path().join("f.py");
    std::fs::write(&file, "").unwrap();
    assert!(matches!(
        build(&file, &GraphConfig::default()),
        Err(BuildError::NotADirectory(_))
    ));
}

#[test]
fn test_build_is_deterministic() {
    let repo = create_repo_with_structure(&[
        ("src/a.py", "from .b import helper\n\ndef main():\n    helper()\n"),
        ("src/b.py", "def helper():\n    pass\n"),
        ("src/c.js", "import { x } from './d';\nfunction run() { x(); }\n"),
        ("src/d.js", "export function x() {}\n"),
    ]);
    let config = GraphConfig {
        threads: 4,
        ..GraphConfig::default()
    };
    let render = |store: &GraphStore| {
        let nodes: Vec<String> = store.nodes().map(|n| n.id.to_string()).collect();
        let edges: Vec<String> = store
            .edges()
            .map(|e| format!("{} -{}-> {}", e.source, e.kind, e.target))
            .collect();
        (nodes, edges)
    };
    let first = render(&build(repo.path(), &config).unwrap().graph);
    for _ in 0..3 {
        assert_eq!(render(&build(repo.path(), &config).unwrap().graph), first);
    }
    assert!(first.1.contains(&"src/c.js -imports-> src/d.js".to_string()));
    assert!(first.1.contains(&"src/c.js::run -invokes-> src/d.js::x".to_string()));
}

#[test]
fn test_reindex_ignores_own_cache() {
    let repo = create_repo_with_structure(&[("pkg/a.py", "def f():\n    pass\n")]);
    let first = build(repo.path(), &py_config()).unwrap().graph;

    let cache = locus_core::cache_dir(repo.path());
    locus_core::save_graph(
        &first,
        &cache.join(locus_core::GRAPH_FILE),
        locus_core::EmbeddingStorage::Reference,
        |_| None,
    )
    .unwrap();
    // even a source file that lands in the cache stays out
    std::fs::write(cache.join("stray.py"), "def g():\n    pass\n").unwrap();

    let second = build(repo.path(), &py_config()).unwrap().graph;
    let ids = |g: &GraphStore| g.nodes().map(|n| n.id.to_string()).collect::<Vec<_>>();
    assert_eq!(ids(&second), ids(&first));
    assert!(!second.contains(&NodeId::from(locus_core::CACHE_DIR)));
}

#[test]
fn test_mixed_language_tree() {
    let repo = create_repo_with_structure(&[
        ("java/Shape.java", "public class Shape { public double area() { return 0; } }\n"),
        (
            "java/Circle.java",
            "public class Circle extends Shape { public double area() { return scale(1); } double scale(double f) { return f; } }\n",
        ),
        ("native/util.h", "int twice(int x);\n"),
        ("native/util.c", "#include \"util.h\"\nint twice(int x) { return x * 2; }\n"),
        ("native/main.c", "#include \"util.h\"\nint main(void) { return twice(2); }\n"),
        ("docs/readme.txt", "not indexed"),
    ]);
    let config = GraphConfig {
        file_extensions: vec!["java".into(), "c".into(), "h".into()],
        ..GraphConfig::default()
    };
    let out = build(repo.path(), &config).unwrap();
    let graph = &out.graph;
    assert_well_formed(graph);
    assert!(out.skipped.is_empty(), "{:?}", out.skipped);
    // docs/ has no indexed files but is still a directory node
    assert!(graph.node_by_path("docs").is_some());

    assert!(graph.has_edge_between(
        &NodeId::from("java/Circle.java::Circle"),
        &NodeId::from("java/Shape.java::Shape"),
        EdgeKind::Inherits
    ));
    assert!(graph.has_edge_between(
        &NodeId::from("java/Circle.java::Circle.area"),
        &NodeId::from("java/Circle.java::Circle.scale"),
        EdgeKind::Invokes
    ));
    assert!(graph.has_edge_between(
        &NodeId::from("native/main.c"),
        &NodeId::from("native/util.h"),
        EdgeKind::Imports
    ));
    assert!(graph.has_edge_between(
        &NodeId::from("native/main.c::main"),
        &NodeId::from("native/util.c::twice"),
        EdgeKind::Invokes
    ));
}
