//! Single-flight embedding cache with write-through persistence

use crate::error::CacheError;
use crate::provider::EmbeddingProvider;
use crate::store::{EmbeddingLog, Record};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use locus_core::{Context, GraphDocument, NodeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{Instrument, Span};

/// A cached vector. Cheap to clone and share between queries.
pub type Embedding = Arc<[f32]>;

type Flight = Shared<BoxFuture<'static, Result<Embedding, CacheError>>>;

/// In-flight computations are keyed by node and provider.
type FlightKey = (NodeId, String);

/// Where a cached vector came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub provider: Arc<str>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Entry {
    vector: Embedding,
    provenance: Provenance,
}

impl Entry {
    fn from_record(record: Record) -> (NodeId, Entry) {
        let entry = Entry {
            vector: Embedding::from(record.vector),
            provenance: Provenance {
                provider: Arc::from(record.provider),
                created_at: DateTime::from_timestamp_millis(record.created_at).unwrap_or_default(),
            },
        };
        (record.id, entry)
    }

    /// Usable as `provider`'s vector: same provider, same dimension.
    fn serves(&self, provider: &dyn EmbeddingProvider) -> bool {
        *self.provenance.provider == *provider.id() && self.vector.len() == provider.dimension()
    }
}

/// Node embeddings, computed at most once per id and provider.
///
/// Reads go straight to a concurrent map. A miss either joins the
/// computation already running for that id or starts one; the computation
/// runs as its own task, so a caller that stops waiting (a query timeout)
/// does not cancel it. Vectors are appended to the on-disk log before any
/// waiter sees them. A failed computation is reported to every waiter and
/// leaves the id absent, so the next request retries.
///
/// Every entry remembers which provider produced it. An entry from another
/// provider, or of another dimension, counts as a miss and is replaced.
#[derive(Clone)]
pub struct EmbeddingCache {
    inner: Arc<Inner>,
}

struct Inner {
    ready: DashMap<NodeId, Entry>,
    in_flight: Mutex<HashMap<FlightKey, Flight>>,
    log: Option<Arc<Mutex<EmbeddingLog>>>,
    span: Span,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("entries", &self.inner.ready.len())
            .field("in_flight", &self.in_flight())
            .field("path", &self.path())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EmbeddingCache {
    /// A cache that lives only as long as the process.
    pub fn in_memory(ctx: &Context) -> Self {
        Self::with_log(ctx, None, Vec::new())
    }

    /// Open the persistent cache in `dir`, replaying whatever an earlier
    /// run stored there.
    pub fn open(ctx: &Context, dir: &Path) -> Result<Self, CacheError> {
        let (log, records) = EmbeddingLog::open(dir)?;
        let cache = Self::with_log(ctx, Some(log), records);
        tracing::debug!(
            parent: &cache.inner.span,
            dir = %dir.display(),
            entries = cache.len(),
            "embedding cache opened"
        );
        Ok(cache)
    }

    fn with_log(ctx: &Context, log: Option<EmbeddingLog>, records: Vec<Record>) -> Self {
        let ready = DashMap::with_capacity(records.len());
        for record in records {
            let (id, entry) = Entry::from_record(record);
            ready.insert(id, entry);
        }
        EmbeddingCache {
            inner: Arc::new(Inner {
                ready,
                in_flight: Mutex::new(HashMap::new()),
                log: log.map(|log| Arc::new(Mutex::new(log))),
                span: ctx.component("embedding_cache"),
            }),
        }
    }

    /// Path of the backing log, if persistent.
    pub fn path(&self) -> Option<PathBuf> {
        self.inner
            .log
            .as_ref()
            .map(|log| lock(log).path().to_path_buf())
    }

    /// Cached vector for `id` from whichever provider stored it.
    pub fn get(&self, id: &NodeId) -> Option<Embedding> {
        self.inner.ready.get(id).map(|entry| entry.vector.clone())
    }

    /// Cached vector for `id`, only if `provider` produced it.
    pub fn get_for(&self, id: &NodeId, provider: &dyn EmbeddingProvider) -> Option<Embedding> {
        self.inner
            .ready
            .get(id)
            .filter(|entry| entry.serves(provider))
            .map(|entry| entry.vector.clone())
    }

    pub fn provenance(&self, id: &NodeId) -> Option<Provenance> {
        self.inner.ready.get(id).map(|entry| entry.provenance.clone())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.inner.ready.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.ready.is_empty()
    }

    /// Number of computations currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }

    /// Snapshot of every cached vector, sorted by id.
    pub fn entries(&self) -> Vec<(NodeId, Embedding)> {
        let mut entries: Vec<_> = self
            .inner
            .ready
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().vector.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Adopt vectors stored elsewhere, such as inline in a graph document,
    /// as `provider`'s. Vectors of the wrong dimension are ignored, as are
    /// ids already cached for `provider`. Adopted vectors are not written
    /// to the log. Returns how many were adopted.
    pub fn seed<I>(&self, vectors: I, provider: &dyn EmbeddingProvider) -> usize
    where
        I: IntoIterator<Item = (NodeId, Vec<f32>)>,
    {
        let created_at = Utc::now();
        let mut adopted = 0;
        for (id, vector) in vectors {
            if vector.len() != provider.dimension() || self.get_for(&id, provider).is_some() {
                continue;
            }
            let entry = Entry {
                vector: Embedding::from(vector),
                provenance: Provenance {
                    provider: Arc::from(provider.id()),
                    created_at,
                },
            };
            self.inner.ready.insert(id, entry);
            adopted += 1;
        }
        tracing::debug!(parent: &self.inner.span, adopted, "embeddings seeded");
        adopted
    }

    /// Adopt the inline vectors of a loaded graph document.
    pub fn seed_from_document(
        &self,
        document: &GraphDocument,
        provider: &dyn EmbeddingProvider,
    ) -> usize {
        let vectors = document
            .inline_embeddings()
            .map(|(id, vector)| (id.clone(), vector.to_vec()));
        self.seed(vectors, provider)
    }

    /// Drop every cached vector, in memory and on disk.
    pub fn clear(&self) -> Result<(), CacheError> {
        if let Some(log) = &self.inner.log {
            lock(log).reset()?;
        }
        self.inner.ready.clear();
        tracing::info!(parent: &self.inner.span, "embedding cache cleared");
        Ok(())
    }

    /// Return `provider`'s vector for `id`, computing it from `text` on a miss.
    ///
    /// Concurrent callers for the same missing id share one provider call.
    pub async fn get_or_compute(
        &self,
        id: &NodeId,
        text: &str,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Embedding, CacheError> {
        if let Some(hit) = self.get_for(id, provider.as_ref()) {
            return Ok(hit);
        }

        let flight = {
            let mut flights = lock(&self.inner.in_flight);
            // a flight may have finished between the first check and the lock
            if let Some(hit) = self.get_for(id, provider.as_ref()) {
                return Ok(hit);
            }
            let key = (id.clone(), provider.id().to_string());
            match flights.get(&key) {
                Some(flight) => flight.clone(),
                None => {
                    if let Some(stale) = self.provenance(id) {
                        tracing::debug!(
                            parent: &self.inner.span,
                            id = %id,
                            stored_by = %stale.provider,
                            provider = provider.id(),
                            "cached embedding from another provider, recomputing"
                        );
                    }
                    let flight = self.start(key.clone(), text.to_string(), provider);
                    flights.insert(key, flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    fn start(&self, key: FlightKey, text: String, provider: Arc<dyn EmbeddingProvider>) -> Flight {
        let inner = Arc::clone(&self.inner);
        let span = tracing::debug_span!(parent: &self.inner.span, "embed", id = %key.0);
        let task = tokio::spawn(
            async move {
                let result = compute(&inner, &key.0, &text, provider.as_ref()).await;
                // under the flight lock, so a new caller sees the vector or no flight
                lock(&inner.in_flight).remove(&key);
                result
            }
            .instrument(span),
        );
        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => Err(CacheError::Aborted(err.to_string())),
            }
        }
        .boxed()
        .shared()
    }
}

async fn compute(
    inner: &Inner,
    id: &NodeId,
    text: &str,
    provider: &dyn EmbeddingProvider,
) -> Result<Embedding, CacheError> {
    let vector = match provider.embed_one(text).await {
        Ok(vector) => vector,
        Err(err) => {
            tracing::warn!(provider = provider.id(), error = %err, "embedding failed");
            return Err(err.into());
        }
    };
    if vector.len() != provider.dimension() {
        return Err(CacheError::DimensionMismatch {
            id: id.clone(),
            expected: provider.dimension(),
            found: vector.len(),
        });
    }
    let record = Record {
        id: id.clone(),
        provider: provider.id().to_string(),
        created_at: Utc::now().timestamp_millis(),
        vector,
    };
    // file writes and fsync stay off the async workers
    let record = match &inner.log {
        Some(log) => {
            let log = Arc::clone(log);
            tokio::task::spawn_blocking(move || lock(&log).append(&record).map(|()| record))
                .await
                .map_err(|e| CacheError::Aborted(e.to_string()))??
        }
        None => record,
    };
    let (id, entry) = Entry::from_record(record);
    let vector = entry.vector.clone();
    inner.ready.insert(id, entry);
    tracing::trace!(provider = provider.id(), "embedding stored");
    Ok(vector)
}
