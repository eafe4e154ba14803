//! Error types shared across the workspace

use std::path::PathBuf;

use crate::model::NodeId;

/// Structural errors raised by the graph store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("unknown edge endpoint: {id}")]
    UnknownEndpoint { id: NodeId },

    #[error("duplicate node id: {id}")]
    DuplicateNode { id: NodeId },

    #[error("graph is frozen; no further mutation is allowed")]
    Frozen,

    #[error("node {id} already has a Contains parent")]
    MultipleParents { id: NodeId },

    #[error("Contains edge {parent} -> {child} would close a cycle")]
    ContainsCycle { parent: NodeId, child: NodeId },

    #[error("node {id} has line_start {start} after line_end {end}")]
    InvalidLineRange { id: NodeId, start: u32, end: u32 },
}

/// Failures reading or writing a persisted graph document.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("graph document I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("graph document could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt graph document: {0}")]
    Corrupt(String),

    #[error("unsupported graph document version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Configuration loading or validation problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
