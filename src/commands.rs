//! CLI command implementations

use anyhow::{Context as _, bail};
use locus_core::{
    Context, EmbeddingStorage, GRAPH_FILE, GraphDocument, GraphStore, LocusConfig, NodeKind,
    clear_cache, load_document, load_graph, save_graph,
};
use locus_embed::{EmbeddingCache, EmbeddingProvider, HashingEmbedder};
use locus_retrieval::{EmbeddingMode, INDEX_FILE, QueryRequest, RetrievalEngine, build_index};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub kinds: Vec<String>,
    pub path: Option<String>,
    pub on_demand: bool,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<LocusConfig> {
    match path {
        Some(path) => LocusConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => LocusConfig::from_env().context("Invalid LOCUS_* environment override"),
    }
}

fn run_context(command: &str) -> Context {
    Context::new(format!("{command}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S")))
}

fn open_cache(ctx: &Context, cache_dir: &Path) -> anyhow::Result<EmbeddingCache> {
    EmbeddingCache::open(ctx, cache_dir)
        .with_context(|| format!("Failed to open embedding cache in {}", cache_dir.display()))
}

fn provider(config: &LocusConfig) -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbedder::new(config.embedding.dimension))
}

fn cached_graph_path(cache_dir: &Path) -> anyhow::Result<PathBuf> {
    let path = cache_dir.join(GRAPH_FILE);
    if !path.exists() {
        bail!("No graph at {}; run `locus index` first", path.display());
    }
    Ok(path)
}

fn load_cached_graph(cache_dir: &Path) -> anyhow::Result<GraphStore> {
    let path = cached_graph_path(cache_dir)?;
    load_graph(&path).with_context(|| format!("Failed to load graph {}", path.display()))
}

fn load_cached_document(cache_dir: &Path) -> anyhow::Result<GraphDocument> {
    let path = cached_graph_path(cache_dir)?;
    load_document(&path).with_context(|| format!("Failed to load graph {}", path.display()))
}

pub async fn index(root: &Path, config: &LocusConfig, inline_embeddings: bool) -> anyhow::Result<()> {
    tracing::info!("Indexing repository: {}", root.display());
    let ctx = run_context("index");
    let cache_dir = config.cache_dir_for(root);

    let builder = locus_indexer::GraphBuilder::new(&ctx, config.graph.clone());
    let output = builder
        .build(root)
        .with_context(|| format!("Failed to index {}", root.display()))?;
    let graph = output.graph;

    let storage = if inline_embeddings {
        EmbeddingStorage::Inline
    } else {
        EmbeddingStorage::Reference
    };
    let cache = if inline_embeddings {
        Some(open_cache(&ctx, &cache_dir)?)
    } else {
        None
    };
    let provider = provider(config);
    let graph_path = cache_dir.join(GRAPH_FILE);
    save_graph(&graph, &graph_path, storage, |id| {
        cache
            .as_ref()
            .and_then(|c| c.get_for(id, provider.as_ref()))
            .map(|v| v.to_vec())
    })
    .with_context(|| format!("Failed to write {}", graph_path.display()))?;

    let index_path = cache_dir.join(INDEX_FILE);
    let lexical = build_index(&graph, &config.retrieval);
    lexical
        .save(&index_path)
        .with_context(|| format!("Failed to write {}", index_path.display()))?;

    println!("{}", graph.stats());
    println!("indexed terms: {}", lexical.term_count());
    for skipped in &output.skipped {
        println!("skipped {}: {}", skipped.path, skipped.reason);
    }
    tracing::info!("Graph written to {}", graph_path.display());
    Ok(())
}

pub async fn query(
    root: &Path,
    config: &LocusConfig,
    text: &str,
    options: QueryOptions,
) -> anyhow::Result<()> {
    let ctx = run_context("query");
    let cache_dir = config.cache_dir_for(root);
    let document = load_cached_document(&cache_dir)?;
    let embeddings = if config.embedding.enabled {
        let cache = open_cache(&ctx, &cache_dir)?;
        let provider = provider(config);
        let seeded = cache.seed_from_document(&document, provider.as_ref());
        if seeded > 0 {
            tracing::debug!("Seeded {seeded} embeddings from the graph document");
        }
        Some((cache, provider))
    } else {
        None
    };
    let graph = Arc::new(
        document
            .into_store()
            .with_context(|| format!("Failed to load graph {}", cache_dir.join(GRAPH_FILE).display()))?,
    );

    let index_path = cache_dir.join(INDEX_FILE);
    let mut engine = if index_path.exists() {
        RetrievalEngine::open(&ctx, Arc::clone(&graph), &index_path, config.retrieval.clone())
            .with_context(|| format!("Failed to open index {}", index_path.display()))?
    } else {
        tracing::warn!("No lexical index at {}; rebuilding in memory", index_path.display());
        let lexical = Arc::new(build_index(&graph, &config.retrieval));
        RetrievalEngine::new(&ctx, Arc::clone(&graph), lexical, config.retrieval.clone())?
    };
    if let Some((cache, provider)) = embeddings {
        engine = engine
            .with_embeddings(cache, provider)
            .with_query_timeout(Duration::from_millis(config.embedding.query_timeout_ms));
    }

    let mut request = QueryRequest::new(text);
    if let Some(top_k) = options.top_k {
        request = request.with_top_k(top_k);
    }
    if !options.kinds.is_empty() {
        let kinds = options
            .kinds
            .iter()
            .map(|k| NodeKind::parse(k).with_context(|| format!("Unknown node kind: {k}")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        request = request.with_kinds(kinds);
    }
    if let Some(prefix) = options.path {
        request = request.with_path_prefix(prefix);
    }
    if options.on_demand {
        let timeout = config.embedding.on_demand_timeout_ms.map(Duration::from_millis);
        request = request.with_embedding_mode(EmbeddingMode::OnDemand { timeout });
    }

    let response = engine.query(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn stats(root: &Path, config: &LocusConfig) -> anyhow::Result<()> {
    let graph = load_cached_graph(&config.cache_dir_for(root))?;
    println!("{}", graph.stats());
    Ok(())
}

pub async fn warm(root: &Path, config: &LocusConfig) -> anyhow::Result<()> {
    if !config.embedding.enabled {
        bail!("Embeddings are disabled in the configuration");
    }
    let ctx = run_context("warm");
    let cache_dir = config.cache_dir_for(root);
    let graph = load_cached_graph(&cache_dir)?;
    let cache = open_cache(&ctx, &cache_dir)?;

    let report = cache
        .prewarm_graph(&graph, provider(config), config.embedding.prewarm_concurrency)
        .await;
    println!(
        "embedded {} nodes ({} cached in total)",
        report.succeeded.len(),
        cache.len()
    );
    for (id, err) in &report.failed {
        println!("failed {id}: {err}");
    }
    if !report.is_complete() {
        bail!("{} embeddings could not be computed", report.failed.len());
    }
    Ok(())
}

pub fn clear(root: &Path, config: &LocusConfig) -> anyhow::Result<()> {
    let cache_dir = config.cache_dir_for(root);
    tracing::info!("Clearing cache: {}", cache_dir.display());

    if clear_cache(&cache_dir)? {
        tracing::info!("Cache cleared");
    } else {
        tracing::info!("Nothing to clear");
    }
    Ok(())
}
