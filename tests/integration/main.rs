//! Integration tests for Locus
//!
//! These tests drive the indexer, persistence, embedding cache and retrieval
//! engine together over throwaway source trees.

use locus_core::test_utils::create_repo_with_structure;
use locus_core::{
    Context, EdgeKind, EmbeddingStorage, GRAPH_FILE, GraphConfig, GraphStore, LocusConfig, NodeId,
    NodeKind, cache_dir, clear_cache, load_document, load_graph, save_graph,
};
use locus_embed::{EmbeddingCache, EmbeddingProvider, HashingEmbedder};
use locus_retrieval::{EmbeddingMode, INDEX_FILE, QueryRequest, RetrievalEngine, build_index};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const CONFIG_PY: &str = r#"class ConfigLoader:
    """Loads configuration files from disk."""

    def load(self, path):
        return self.parse(path)

    def parse(self, path):
        pass
"#;

const MAIN_PY: &str = r#"from .config import ConfigLoader


class App(ConfigLoader):
    pass


def run():
    loader = ConfigLoader()
    loader.load("settings.toml")
"#;

const UTIL_JS: &str = "export function formatDate(d) {\n  return d.toISOString();\n}\n";

fn sample_repo() -> TempDir {
    create_repo_with_structure(&[
        ("app/config.py", CONFIG_PY),
        ("app/main.py", MAIN_PY),
        ("web/util.js", UTIL_JS),
        ("README.md", "# sample\n"),
    ])
}

fn config() -> LocusConfig {
    LocusConfig {
        graph: GraphConfig {
            max_depth: 10,
            ..GraphConfig::default()
        },
        ..LocusConfig::default()
    }
}

/// Index `root` and persist the graph and lexical index into its cache dir.
fn index_and_save(root: &Path, config: &LocusConfig) -> GraphStore {
    let out = locus_indexer::build(root, &config.graph).unwrap();
    assert!(out.skipped.is_empty(), "{:?}", out.skipped);
    let dir = config.cache_dir_for(root);
    save_graph(&out.graph, &dir.join(GRAPH_FILE), EmbeddingStorage::Reference, |_| None).unwrap();
    build_index(&out.graph, &config.retrieval)
        .save(&dir.join(INDEX_FILE))
        .unwrap();
    out.graph
}

#[test]
fn test_index_builds_cross_language_graph() {
    let repo = sample_repo();
    let out = locus_indexer::build(repo.path(), &config().graph).unwrap();
    let graph = &out.graph;

    // README.md is not a configured extension
    assert!(graph.get_node(&NodeId::from("README.md")).is_none());
    for id in [
        "app",
        "app/config.py",
        "app/config.py::ConfigLoader",
        "app/config.py::ConfigLoader.load",
        "app/main.py::App",
        "app/main.py::run",
        "web/util.js::formatDate",
    ] {
        assert!(graph.contains(&NodeId::from(id)), "missing {id}");
    }

    let has = |from: &str, to: &str, kind| {
        graph.has_edge_between(&NodeId::from(from), &NodeId::from(to), kind)
    };
    assert!(has("app/main.py", "app/config.py", EdgeKind::Imports));
    assert!(has("app/main.py::App", "app/config.py::ConfigLoader", EdgeKind::Inherits));
    assert!(has("app/main.py::run", "app/config.py::ConfigLoader", EdgeKind::Invokes));
    assert!(has(
        "app/config.py::ConfigLoader.load",
        "app/config.py::ConfigLoader.parse",
        EdgeKind::Invokes
    ));

    let stats = graph.stats();
    assert_eq!(stats.node_counts[&NodeKind::Directory], 2);
    assert_eq!(stats.node_counts[&NodeKind::File], 3);
}

#[test]
fn test_persisted_graph_reloads_identically() {
    let repo = sample_repo();
    let config = config();
    let graph = index_and_save(repo.path(), &config);

    let loaded = load_graph(&config.cache_dir_for(repo.path()).join(GRAPH_FILE)).unwrap();
    assert!(loaded.is_frozen());
    assert_eq!(loaded.stats(), graph.stats());
    let ids = |g: &GraphStore| g.nodes().map(|n| n.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&loaded), ids(&graph));
    let loader = loaded
        .get_node(&NodeId::from("app/config.py::ConfigLoader"))
        .unwrap();
    assert_eq!(loader.meta("docstring"), Some("Loads configuration files from disk."));
}

#[tokio::test]
async fn test_query_against_saved_index() {
    let repo = sample_repo();
    let config = config();
    index_and_save(repo.path(), &config);
    let dir = config.cache_dir_for(repo.path());

    let graph = Arc::new(load_graph(&dir.join(GRAPH_FILE)).unwrap());
    let ctx = Context::new("integration");
    let engine =
        RetrievalEngine::open(&ctx, graph, &dir.join(INDEX_FILE), config.retrieval.clone()).unwrap();

    let response = engine
        .query(&QueryRequest::new("ConfigLoader").with_kinds([NodeKind::Class]))
        .await
        .unwrap();
    assert!(response.warnings.is_empty());
    assert_eq!(response.matches[0].node_id.as_str(), "app/config.py::ConfigLoader");
    assert_eq!(response.matches[0].signals.fuzzy, 1.0);
    assert!(response.matches.iter().all(|m| m.summary.kind == NodeKind::Class));

    let js = engine
        .query(&QueryRequest::new("format date").with_path_prefix("web/"))
        .await
        .unwrap();
    assert_eq!(js.matches[0].node_id.as_str(), "web/util.js::formatDate");
}

#[tokio::test]
async fn test_warm_cache_survives_restart_and_ranks() {
    let repo = sample_repo();
    let config = config();
    let graph = Arc::new(index_and_save(repo.path(), &config));
    let dir = config.cache_dir_for(repo.path());
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(HashingEmbedder::new(config.embedding.dimension));

    let symbols = graph
        .nodes()
        .filter(|n| matches!(n.kind, NodeKind::Class | NodeKind::Function))
        .count();
    {
        let cache = EmbeddingCache::open(&Context::detached(), &dir).unwrap();
        let report = cache
            .prewarm_graph(&graph, provider.clone(), config.embedding.prewarm_concurrency)
            .await;
        assert!(report.is_complete());
        assert_eq!(report.succeeded.len(), symbols);
    }

    // a fresh process sees every vector without calling the provider again
    let cache = EmbeddingCache::open(&Context::detached(), &dir).unwrap();
    assert_eq!(cache.len(), symbols);

    let index = Arc::new(build_index(&graph, &config.retrieval));
    let engine = RetrievalEngine::new(&Context::detached(), graph.clone(), index, config.retrieval.clone())
        .unwrap()
        .with_embeddings(cache.clone(), provider);
    let response = engine
        .query(&QueryRequest::new("loads configuration files"))
        .await
        .unwrap();
    assert_eq!(response.matches[0].node_id.as_str(), "app/config.py::ConfigLoader");
    assert!(response.matches[0].signals.embedding.is_some_and(|e| e > 0.0));

    // on-demand mode embeds the structural nodes too
    let on_demand = QueryRequest::new("config").with_embedding_mode(EmbeddingMode::OnDemand { timeout: None });
    let response = engine.query(&on_demand).await.unwrap();
    assert!(response.warnings.is_empty());
    assert_eq!(cache.len(), graph.node_count());
}

#[tokio::test]
async fn test_inline_embeddings_and_clear() {
    let repo = sample_repo();
    let config = config();
    let graph = index_and_save(repo.path(), &config);
    let dir = cache_dir(repo.path());
    assert_eq!(dir, config.cache_dir_for(repo.path()));

    let cache = EmbeddingCache::open(&Context::detached(), &dir).unwrap();
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(16));
    cache.prewarm_graph(&graph, provider, 4).await;

    let inline = dir.join("inline.json");
    save_graph(&graph, &inline, EmbeddingStorage::Inline, |id| {
        cache.get(id).map(|v| v.to_vec())
    })
    .unwrap();
    let document = load_document(&inline).unwrap();
    assert_eq!(document.inline_embeddings().count(), cache.len());
    assert!(document.nodes.iter().all(|n| n.embedding_key.is_none()));

    assert!(clear_cache(&dir).unwrap());
    assert!(!dir.exists());
    assert!(!clear_cache(&dir).unwrap());
}

#[tokio::test]
async fn test_inline_embeddings_serve_queries_without_the_log() {
    let repo = sample_repo();
    let config = config();
    let dir = config.cache_dir_for(repo.path());
    let graph = index_and_save(repo.path(), &config);
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(HashingEmbedder::new(config.embedding.dimension));
    {
        let cache = EmbeddingCache::open(&Context::detached(), &dir).unwrap();
        assert!(cache.prewarm_graph(&graph, provider.clone(), 4).await.is_complete());
        save_graph(&graph, &dir.join(GRAPH_FILE), EmbeddingStorage::Inline, |id| {
            cache.get_for(id, provider.as_ref()).map(|v| v.to_vec())
        })
        .unwrap();
    }
    std::fs::remove_file(dir.join(locus_embed::EMBEDDINGS_FILE)).unwrap();

    let document = load_document(&dir.join(GRAPH_FILE)).unwrap();
    let cache = EmbeddingCache::open(&Context::detached(), &dir).unwrap();
    assert!(cache.is_empty());
    let seeded = cache.seed_from_document(&document, provider.as_ref());
    assert_eq!(seeded, document.inline_embeddings().count());
    assert!(seeded > 0);

    let graph = Arc::new(document.into_store().unwrap());
    let index_path = dir.join(INDEX_FILE);
    let engine =
        RetrievalEngine::open(&Context::detached(), graph, &index_path, config.retrieval.clone())
            .unwrap()
            .with_embeddings(cache, provider);
    let response = engine
        .query(&QueryRequest::new("loads configuration files"))
        .await
        .unwrap();
    assert!(response.warnings.is_empty());
    assert_eq!(response.matches[0].node_id.as_str(), "app/config.py::ConfigLoader");
    assert!(response.matches[0].signals.embedding.is_some());
}

#[test]
fn test_config_file_drives_the_pipeline() {
    let repo = create_repo_with_structure(&[
        ("src/a.py", "def alpha():\n    pass\n"),
        ("lib/b.py", "def beta():\n    pass\n"),
        (
            "locus.toml",
            "[graph]\nfile_extensions = [\".py\"]\nskip_dirs = [\"lib\"]\n\n[retrieval]\ntop_k = 3\n",
        ),
    ]);
    let config = LocusConfig::load(&repo.path().join("locus.toml")).unwrap();
    assert_eq!(config.retrieval.top_k, 3);

    let out = locus_indexer::build(repo.path(), &config.graph).unwrap();
    assert!(out.graph.contains(&NodeId::from("src/a.py::alpha")));
    assert!(!out.graph.contains(&NodeId::from("lib")));
}
