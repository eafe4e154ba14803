use std::path::PathBuf;

/// Lexical index snapshot failures. A snapshot that cannot be decoded is
/// never partially used; rebuild it from the graph.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode index: {0}")]
    Encode(String),

    #[error("corrupt index snapshot {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("unsupported index version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query text is empty")]
    EmptyQuery,

    #[error("top_k must be greater than zero")]
    InvalidTopK,

    #[error("graph must be frozen before it can be queried")]
    GraphNotFrozen,

    #[error(transparent)]
    Index(#[from] IndexError),
}
