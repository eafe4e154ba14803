//! Bulk cache warming with bounded concurrency

use crate::cache::EmbeddingCache;
use crate::error::CacheError;
use crate::provider::{EmbeddingProvider, node_text};
use futures_util::stream::{self, StreamExt};
use locus_core::{GraphStore, NodeId, NodeKind};
use std::sync::Arc;

/// Outcome of [`EmbeddingCache::prewarm`]. Both lists are sorted by id.
#[derive(Debug, Default)]
pub struct PrewarmReport {
    /// Ids whose vector is now cached, including ones that already were.
    pub succeeded: Vec<NodeId>,
    pub failed: Vec<(NodeId, CacheError)>,
}

impl PrewarmReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl EmbeddingCache {
    /// Compute vectors for `items` (id, text), at most `concurrency` at a
    /// time. Failures are recorded per id; they never stop the batch.
    pub async fn prewarm(
        &self,
        items: Vec<(NodeId, String)>,
        provider: Arc<dyn EmbeddingProvider>,
        concurrency: usize,
    ) -> PrewarmReport {
        let total = items.len();
        let results: Vec<(NodeId, Result<(), CacheError>)> = stream::iter(items)
            .map(|(id, text)| {
                let cache = self.clone();
                let provider = Arc::clone(&provider);
                async move {
                    let result = cache.get_or_compute(&id, &text, provider).await.map(|_| ());
                    (id, result)
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut report = PrewarmReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.succeeded.push(id),
                Err(err) => report.failed.push((id, err)),
            }
        }
        report.succeeded.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));
        tracing::info!(
            total,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "embedding prewarm finished"
        );
        report
    }

    /// Prewarm every class and function in `graph`.
    pub async fn prewarm_graph(
        &self,
        graph: &GraphStore,
        provider: Arc<dyn EmbeddingProvider>,
        concurrency: usize,
    ) -> PrewarmReport {
        let items = graph
            .nodes()
            .filter(|node| matches!(node.kind, NodeKind::Class | NodeKind::Function))
            .map(|node| (node.id.clone(), node_text(node)))
            .collect();
        self.prewarm(items, provider, concurrency).await
    }
}
