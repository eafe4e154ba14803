//! Unit tests for retrieval over small graphs

use crate::*;
use async_trait::async_trait;
use locus_core::test_utils::{create_repo_with_structure, sample_graph};
use locus_core::{Context, FusionStrategy, GraphConfig, GraphStore, NodeId, NodeKind, RetrievalConfig};
use locus_embed::{EmbeddingCache, EmbeddingProvider, HashingEmbedder, ProviderError};
use std::sync::Arc;
use std::time::Duration;

fn frozen_sample() -> Arc<GraphStore> {
    let mut graph = sample_graph();
    graph.freeze();
    Arc::new(graph)
}

fn engine_for(graph: Arc<GraphStore>, config: RetrievalConfig) -> RetrievalEngine {
    let index = Arc::new(build_index(&graph, &config));
    RetrievalEngine::new(&Context::detached(), graph, index, config).unwrap()
}

fn ids(response: &QueryResponse) -> Vec<&str> {
    response.matches.iter().map(|m| m.node_id.as_str()).collect()
}

/// Fails every call.
struct DownProvider;

#[async_trait]
impl EmbeddingProvider for DownProvider {
    fn id(&self) -> &str {
        "down"
    }

    fn dimension(&self) -> usize {
        8
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Unavailable("connection refused".to_string()))
    }
}

/// Never answers.
struct HangingProvider;

#[async_trait]
impl EmbeddingProvider for HangingProvider {
    fn id(&self) -> &str {
        "hanging"
    }

    fn dimension(&self) -> usize {
        8
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        std::future::pending().await
    }
}

/// Answers queries immediately but takes its time over node texts.
struct SlowNodeProvider(HashingEmbedder);

#[async_trait]
impl EmbeddingProvider for SlowNodeProvider {
    fn id(&self) -> &str {
        "slow"
    }

    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.iter().any(|t| t.contains('\n')) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.0.embed(texts).await
    }
}

#[tokio::test]
async fn test_query_ranks_matching_class_first() {
    let repo = create_repo_with_structure(&[(
        "pkg/a.py",
        "class Foo:\n    pass\n\n\ndef bar():\n    return 1\n",
    )]);
    let config = GraphConfig {
        file_extensions: vec![".py".to_string()],
        max_depth: 10,
        ..GraphConfig::default()
    };
    let graph = Arc::new(locus_indexer::build(repo.path(), &config).unwrap().graph);
    let engine = engine_for(graph, RetrievalConfig::default());

    let response = engine.query(&QueryRequest::new("Foo")).await.unwrap();
    assert!(response.warnings.is_empty());
    assert_eq!(ids(&response), vec!["pkg/a.py::Foo"]);
    let top = &response.matches[0];
    assert_eq!(top.summary.kind, NodeKind::Class);
    assert_eq!(top.signals.fuzzy, 1.0);
    assert!(top.signals.lexical > 0.0);
    assert_eq!(top.signals.embedding, None);
    insta::assert_json_snapshot!(top.summary, @r###"
    {
      "name": "Foo",
      "kind": "class",
      "path": "pkg/a.py",
      "line_start": 1,
      "line_end": 2
    }
    "###);
}

#[tokio::test]
async fn test_query_is_deterministic() {
    let engine = engine_for(frozen_sample(), RetrievalConfig::default());
    let request = QueryRequest::new("foo run bar pkg");
    let first = engine.query(&request).await.unwrap();
    assert!(first.matches.len() > 2);
    for _ in 0..5 {
        assert_eq!(engine.query(&request).await.unwrap(), first);
    }
    // ordered by score, ties by id
    for pair in first.matches.windows(2) {
        assert!(
            pair[0].score > pair[1].score
                || (pair[0].score == pair[1].score && pair[0].node_id < pair[1].node_id)
        );
    }
}

#[tokio::test]
async fn test_invalid_queries_are_rejected() {
    let engine = engine_for(frozen_sample(), RetrievalConfig::default());
    assert!(matches!(
        engine.query(&QueryRequest::new("   ")).await,
        Err(QueryError::EmptyQuery)
    ));
    assert!(matches!(
        engine.query(&QueryRequest::new("Foo").with_top_k(0)).await,
        Err(QueryError::InvalidTopK)
    ));
}

#[test]
fn test_unfrozen_graph_is_rejected() {
    let graph = Arc::new(sample_graph());
    let index = Arc::new(build_index(&graph, &RetrievalConfig::default()));
    let result = RetrievalEngine::new(&Context::detached(), graph, index, RetrievalConfig::default());
    assert!(matches!(result, Err(QueryError::GraphNotFrozen)));
}

#[tokio::test]
async fn test_filters_restrict_candidates() {
    let engine = engine_for(frozen_sample(), RetrievalConfig::default());

    let functions = engine
        .query(&QueryRequest::new("Foo").with_kinds([NodeKind::Function]))
        .await
        .unwrap();
    assert_eq!(ids(&functions), vec!["pkg/a.py::Foo.run"]);

    let in_b = engine
        .query(&QueryRequest::new("Foo").with_path_prefix("./pkg/b.py"))
        .await
        .unwrap();
    assert_eq!(ids(&in_b), vec!["pkg/b.py::Baz"]);

    let limited = engine
        .query(&QueryRequest::new("Foo").with_top_k(1))
        .await
        .unwrap();
    assert_eq!(ids(&limited), vec!["pkg/a.py::Foo"]);
}

#[tokio::test]
async fn test_cached_embeddings_contribute() {
    let graph = frozen_sample();
    let cache = EmbeddingCache::in_memory(&Context::detached());
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(64));
    assert!(cache.prewarm_graph(&graph, provider.clone(), 4).await.is_complete());

    let engine =
        engine_for(graph, RetrievalConfig::default()).with_embeddings(cache, provider);
    let response = engine
        .query(&QueryRequest::new("configuration parser"))
        .await
        .unwrap();
    assert!(response.warnings.is_empty());
    let top = &response.matches[0];
    assert_eq!(top.node_id.as_str(), "pkg/a.py::Foo");
    assert!(top.signals.embedding.is_some_and(|e| e > 0.0));
    // directories were never embedded
    assert!(response
        .matches
        .iter()
        .filter(|m| m.summary.kind == NodeKind::Directory)
        .all(|m| m.signals.embedding.is_none()));
}

#[tokio::test]
async fn test_provider_outage_degrades_with_warning() {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(DownProvider);
    let engine = engine_for(frozen_sample(), RetrievalConfig::default())
        .with_embeddings(EmbeddingCache::in_memory(&Context::detached()), provider);

    let request = QueryRequest::new("Foo")
        .with_embedding_mode(EmbeddingMode::OnDemand { timeout: None });
    let response = engine.query(&request).await.unwrap();
    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].contains("unavailable"));
    assert_eq!(response.matches[0].node_id.as_str(), "pkg/a.py::Foo");
    assert!(response.matches.iter().all(|m| m.signals.embedding.is_none()));

    // nothing cached, so the default mode never calls the provider
    let quiet = engine.query(&QueryRequest::new("Foo")).await.unwrap();
    assert!(quiet.warnings.is_empty());
}

#[tokio::test]
async fn test_hanging_provider_does_not_block_default_queries() {
    let cache = EmbeddingCache::in_memory(&Context::detached());
    assert_eq!(
        cache.seed([(NodeId::from("pkg/a.py::Foo"), vec![1.0; 8])], &HangingProvider),
        1
    );
    let engine = engine_for(frozen_sample(), RetrievalConfig::default())
        .with_embeddings(cache, Arc::new(HangingProvider))
        .with_query_timeout(Duration::from_millis(50));

    let response = tokio::time::timeout(
        Duration::from_secs(2),
        engine.query(&QueryRequest::new("Foo")),
    )
    .await
    .expect("default query must not wait on the provider")
    .unwrap();
    assert!(response.warnings.iter().any(|w| w.contains("timed out")));
    assert_eq!(response.matches[0].node_id.as_str(), "pkg/a.py::Foo");
    assert!(response.matches.iter().all(|m| m.signals.embedding.is_none()));
}

#[tokio::test]
async fn test_default_query_timeout_applies() {
    let cache = EmbeddingCache::in_memory(&Context::detached());
    cache.seed([(NodeId::from("pkg/a.py::Foo"), vec![1.0; 8])], &HangingProvider);
    let engine = engine_for(frozen_sample(), RetrievalConfig::default())
        .with_embeddings(cache, Arc::new(HangingProvider));

    let started = tokio::time::Instant::now();
    let response = engine.query(&QueryRequest::new("Foo")).await.unwrap();
    assert!(started.elapsed() >= DEFAULT_QUERY_EMBED_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(response.warnings[0].contains("timed out"));
}

#[tokio::test]
async fn test_on_demand_fills_the_cache() {
    let graph = frozen_sample();
    let cache = EmbeddingCache::in_memory(&Context::detached());
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(64));
    let engine = engine_for(graph.clone(), RetrievalConfig::default())
        .with_embeddings(cache.clone(), provider);

    let request = QueryRequest::new("Foo")
        .with_embedding_mode(EmbeddingMode::OnDemand { timeout: None });
    let response = engine.query(&request).await.unwrap();
    assert!(response.warnings.is_empty());
    assert_eq!(cache.len(), graph.node_count());
    assert!(response.matches.iter().all(|m| m.signals.embedding.is_some()));
}

#[tokio::test]
async fn test_on_demand_timeout_leaves_cache_consistent() {
    let graph = frozen_sample();
    let cache = EmbeddingCache::in_memory(&Context::detached());
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(SlowNodeProvider(HashingEmbedder::new(32)));
    let engine = engine_for(graph.clone(), RetrievalConfig::default())
        .with_embeddings(cache.clone(), provider);

    let request = QueryRequest::new("Foo").with_embedding_mode(EmbeddingMode::OnDemand {
        timeout: Some(Duration::from_millis(20)),
    });
    let response = engine.query(&request).await.unwrap();
    assert!(response.warnings.iter().any(|w| w.contains("timed out")));
    assert_eq!(response.matches[0].node_id.as_str(), "pkg/a.py::Foo");

    // the abandoned computations finish in the background
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(cache.len(), graph.node_count());
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn test_reciprocal_rank_fusion() {
    let config = RetrievalConfig {
        fusion: FusionStrategy::ReciprocalRank { k: 60.0 },
        ..RetrievalConfig::default()
    };
    let engine = engine_for(frozen_sample(), config);
    let response = engine.query(&QueryRequest::new("Foo")).await.unwrap();
    assert_eq!(response.matches[0].node_id.as_str(), "pkg/a.py::Foo");
    // third on lexical (longer document), first on fuzzy
    assert_eq!(response.matches[0].score, 1.0 / 63.0 + 1.0 / 61.0);
    assert_eq!(response.matches[1].node_id.as_str(), "pkg/b.py::Baz");
}

#[tokio::test]
async fn test_engine_opens_saved_index() {
    let dir = tempfile::tempdir().unwrap();
    let graph = frozen_sample();
    let config = RetrievalConfig::default();
    let path = dir.path().join(INDEX_FILE);
    build_index(&graph, &config).save(&path).unwrap();

    let engine = RetrievalEngine::open(&Context::detached(), graph, &path, config.clone()).unwrap();
    assert!(engine.index().contains(&NodeId::from("pkg/a.py::Foo")));

    std::fs::write(&path, b"garbage!").unwrap();
    let err = RetrievalEngine::open(&Context::detached(), frozen_sample(), &path, config).unwrap_err();
    assert!(matches!(err, QueryError::Index(_)));
}
