//! Locus Core: graph data model, store, navigation, persistence and config

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod model;
pub mod navigate;
pub mod persist;
pub mod stats;


#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{EmbeddingConfig, FusionStrategy, FuzzyMetric, GraphConfig, LocusConfig, RetrievalConfig};
pub use context::Context;
pub use error::{ConfigError, GraphError, PersistError};
pub use graph::{Direction, GraphStore};
pub use model::{CodeEdge, CodeNode, EdgeKind, Metadata, NodeId, NodeKind, path_key};
pub use navigate::{FileEntities, RelationMap};
pub use persist::{
    CACHE_DIR, EmbeddingStorage, FORMAT_VERSION, GRAPH_FILE, GraphDocument, cache_dir, clear_cache,
    ensure_cache_dir, load_document, load_graph, save_graph,
};
pub use stats::GraphStats;
