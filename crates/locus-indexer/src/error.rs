use locus_core::{ConfigError, GraphError};
use std::path::PathBuf;

/// Failures that abort a whole build. Per-file problems never land here;
/// they are reported as [`crate::SkippedFile`]s instead.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("source root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("source root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("invalid graph config: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid skip_dirs pattern {pattern:?}: {reason}")]
    InvalidSkipPattern { pattern: String, reason: String },

    #[error("cannot start analysis workers: {0}")]
    ThreadPool(String),

    #[error("graph construction failed: {0}")]
    Graph(#[from] GraphError),
}
