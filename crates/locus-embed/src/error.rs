use locus_core::NodeId;
use std::path::PathBuf;

/// Failures reported by an [`crate::EmbeddingProvider`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("provider returned {got} vectors for {expected} inputs")]
    BatchSize { expected: usize, got: usize },
}

/// Errors from the embedding cache.
///
/// `Clone` so a single failed computation can be handed to every caller
/// waiting on the same key.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("embedding for {id} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        id: NodeId,
        expected: usize,
        found: usize,
    },

    #[error("embedding store I/O error at {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("corrupt embedding store {path} at byte {offset}: {reason}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("embedding task aborted: {0}")]
    Aborted(String),
}

impl CacheError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}
