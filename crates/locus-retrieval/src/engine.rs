//! Hybrid retrieval over a frozen graph

use crate::error::QueryError;
use crate::fusion::{Signals, fuse};
use crate::fuzzy::NameMatcher;
use crate::index::LexicalIndex;
use futures_util::stream::{self, StreamExt};
use locus_core::{CodeNode, Context, GraphStore, NodeId, NodeKind, RetrievalConfig};
use locus_embed::{EmbeddingCache, EmbeddingProvider, cosine_similarity, node_text};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, Span};

/// Concurrent node embeddings computed for one on-demand query.
const ON_DEMAND_CONCURRENCY: usize = 16;

/// Default bound on embedding the query text when only cached vectors are used.
pub const DEFAULT_QUERY_EMBED_TIMEOUT: Duration = Duration::from_millis(500);

/// Restrictions applied before any scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilters {
    /// Empty means every kind.
    pub node_kinds: Vec<NodeKind>,
    /// Root-relative path prefix, e.g. `src/` or `pkg/a.py`.
    pub path_prefix: Option<String>,
}

impl QueryFilters {
    fn accepts(&self, node: &CodeNode) -> bool {
        if !self.node_kinds.is_empty() && !self.node_kinds.contains(&node.kind) {
            return false;
        }
        match &self.path_prefix {
            None => true,
            Some(prefix) => {
                let prefix = prefix.trim_start_matches("./");
                node.path_str().is_some_and(|path| path.starts_with(prefix))
            }
        }
    }
}

/// How a query obtains node embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// Use vectors already cached; nodes without one get no embedding signal.
    #[default]
    Cached,
    /// Compute missing node vectors first, giving up after `timeout`.
    OnDemand { timeout: Option<Duration> },
    /// Lexical and fuzzy signals only.
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub text: String,
    /// Falls back to the configured `top_k`.
    pub top_k: Option<usize>,
    pub filters: QueryFilters,
    pub embedding_mode: EmbeddingMode,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        QueryRequest {
            text: text.into(),
            top_k: None,
            filters: QueryFilters::default(),
            embedding_mode: EmbeddingMode::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = NodeKind>) -> Self {
        self.filters.node_kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filters.path_prefix = Some(prefix.into());
        self
    }

    pub fn with_embedding_mode(mut self, mode: EmbeddingMode) -> Self {
        self.embedding_mode = mode;
        self
    }
}

/// What a consumer needs to show or open a match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub kind: NodeKind,
    pub path: Option<String>,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
}

impl From<&CodeNode> for NodeSummary {
    fn from(node: &CodeNode) -> Self {
        NodeSummary {
            name: node.name.clone(),
            kind: node.kind,
            path: node.path_str(),
            line_start: node.line_start,
            line_end: node.line_end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMatch {
    pub node_id: NodeId,
    pub score: f64,
    pub signals: Signals,
    pub summary: NodeSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    pub matches: Vec<RankedMatch>,
    /// Degradations the caller may want to act on, e.g. a failing provider.
    pub warnings: Vec<String>,
}

/// Ranks graph nodes against free-text queries.
///
/// Holds only shared, read-only state, so one engine serves any number of
/// concurrent queries.
pub struct RetrievalEngine {
    graph: Arc<GraphStore>,
    index: Arc<LexicalIndex>,
    embeddings: Option<(EmbeddingCache, Arc<dyn EmbeddingProvider>)>,
    query_timeout: Duration,
    matcher: NameMatcher,
    config: RetrievalConfig,
    span: Span,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("nodes", &self.graph.node_count())
            .field("documents", &self.index.len())
            .field("embeddings", &self.embeddings.as_ref().map(|(_, p)| p.id()))
            .field("config", &self.config)
            .finish()
    }
}

impl RetrievalEngine {
    pub fn new(
        ctx: &Context,
        graph: Arc<GraphStore>,
        index: Arc<LexicalIndex>,
        config: RetrievalConfig,
    ) -> Result<Self, QueryError> {
        if !graph.is_frozen() {
            return Err(QueryError::GraphNotFrozen);
        }
        Ok(RetrievalEngine {
            graph,
            index,
            embeddings: None,
            query_timeout: DEFAULT_QUERY_EMBED_TIMEOUT,
            matcher: NameMatcher::new(config.fuzzy_metric, config.fuzzy_threshold),
            config,
            span: ctx.component("retrieval"),
        })
    }

    /// Like [`RetrievalEngine::new`], reading the lexical index from a snapshot.
    pub fn open(
        ctx: &Context,
        graph: Arc<GraphStore>,
        index_path: &Path,
        config: RetrievalConfig,
    ) -> Result<Self, QueryError> {
        let index = LexicalIndex::load(index_path)?;
        Self::new(ctx, graph, Arc::new(index), config)
    }

    /// Enable the embedding signal.
    pub fn with_embeddings(
        mut self,
        cache: EmbeddingCache,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        self.embeddings = Some((cache, provider));
        self
    }

    /// Bound on embedding the query text in [`EmbeddingMode::Cached`].
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn index(&self) -> &LexicalIndex {
        &self.index
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let top_k = request.top_k.unwrap_or(self.config.top_k);
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }
        Ok(self
            .rank(text, top_k, request)
            .instrument(self.span.clone())
            .await)
    }

    async fn rank(&self, text: &str, top_k: usize, request: &QueryRequest) -> QueryResponse {
        let mut candidates: Vec<&CodeNode> = self
            .graph
            .nodes()
            .filter(|node| request.filters.accepts(node))
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));

        let lexical: HashMap<NodeId, f64> = self.index.scores(text).into_iter().collect();
        let mut warnings = Vec::new();
        let embedding = self
            .embedding_signal(text, &candidates, request.embedding_mode, &mut warnings)
            .await;

        let signals: Vec<Signals> = candidates
            .iter()
            .zip(embedding)
            .map(|(node, embedding)| Signals {
                lexical: lexical.get(&node.id).copied().unwrap_or(0.0),
                fuzzy: self.matcher.score(text, &node.name),
                embedding,
            })
            .collect();
        let fused = fuse(&self.config.fusion, &signals);

        let mut matches: Vec<RankedMatch> = candidates
            .iter()
            .zip(signals)
            .zip(fused)
            .filter(|(_, score)| *score > 0.0)
            .map(|((node, signals), score)| RankedMatch {
                node_id: node.id.clone(),
                score,
                signals,
                summary: NodeSummary::from(*node),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.node_id.cmp(&b.node_id)));
        matches.truncate(top_k);

        for warning in &warnings {
            tracing::warn!(%warning, "retrieval degraded");
        }
        tracing::debug!(
            query = text,
            candidates = candidates.len(),
            matches = matches.len(),
            "query ranked"
        );
        QueryResponse { matches, warnings }
    }

    /// Cosine similarity per candidate, or `None` where no vector exists.
    async fn embedding_signal(
        &self,
        text: &str,
        candidates: &[&CodeNode],
        mode: EmbeddingMode,
        warnings: &mut Vec<String>,
    ) -> Vec<Option<f64>> {
        let absent = vec![None; candidates.len()];
        let Some((cache, provider)) = &self.embeddings else {
            return absent;
        };
        let deadline = match mode {
            EmbeddingMode::Off => return absent,
            EmbeddingMode::Cached
                if !candidates
                    .iter()
                    .any(|n| cache.get_for(&n.id, provider.as_ref()).is_some()) =>
            {
                return absent;
            }
            EmbeddingMode::Cached => Some(Instant::now() + self.query_timeout),
            EmbeddingMode::OnDemand { timeout } => timeout.map(|t| Instant::now() + t),
        };

        let query_vector = match within(deadline, provider.embed_one(text)).await {
            Some(Ok(vector)) => vector,
            Some(Err(err)) => {
                warnings.push(format!(
                    "embedding provider unavailable ({err}); ranked by lexical and fuzzy signals only"
                ));
                return absent;
            }
            None => {
                warnings.push(
                    "query embedding timed out; ranked by lexical and fuzzy signals only".to_string(),
                );
                return absent;
            }
        };

        if matches!(mode, EmbeddingMode::OnDemand { .. }) {
            self.fill_missing(cache, provider, candidates, deadline, warnings)
                .await;
        }

        candidates
            .iter()
            .map(|node| {
                cache
                    .get_for(&node.id, provider.as_ref())
                    .map(|vector| f64::from(cosine_similarity(&query_vector, &vector)).max(0.0))
            })
            .collect()
    }

    /// Compute vectors for candidates the cache lacks. Anything unfinished at
    /// the deadline keeps running inside the cache but is not waited for.
    async fn fill_missing(
        &self,
        cache: &EmbeddingCache,
        provider: &Arc<dyn EmbeddingProvider>,
        candidates: &[&CodeNode],
        deadline: Option<Instant>,
        warnings: &mut Vec<String>,
    ) {
        let missing: Vec<&CodeNode> = candidates
            .iter()
            .copied()
            .filter(|node| cache.get_for(&node.id, provider.as_ref()).is_none())
            .collect();
        if missing.is_empty() {
            return;
        }
        let jobs = stream::iter(missing.iter().copied())
            .map(|node| {
                let provider = Arc::clone(provider);
                async move {
                    cache
                        .get_or_compute(&node.id, &node_text(node), provider)
                        .await
                }
            })
            .buffer_unordered(ON_DEMAND_CONCURRENCY)
            .collect::<Vec<_>>();

        match within(deadline, jobs).await {
            Some(results) => {
                let failed = results.iter().filter(|r| r.is_err()).count();
                if failed > 0 {
                    warnings.push(format!(
                        "{failed} of {} node embeddings could not be computed",
                        missing.len()
                    ));
                }
            }
            None => {
                let pending = missing
                    .iter()
                    .filter(|n| cache.get_for(&n.id, provider.as_ref()).is_none())
                    .count();
                warnings.push(format!(
                    "on-demand embedding timed out; {pending} nodes ranked without an embedding signal"
                ));
            }
        }
    }
}

/// Await `future`, or give up at `deadline`.
async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}
