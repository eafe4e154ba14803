//! Locus Retrieval: lexical, fuzzy and embedding signals fused into one ranking

pub mod engine;
pub mod error;
pub mod fusion;
pub mod fuzzy;
pub mod index;
pub mod tokenize;

#[cfg(test)]
mod tests;

pub use engine::{
    DEFAULT_QUERY_EMBED_TIMEOUT, EmbeddingMode, NodeSummary, QueryFilters, QueryRequest,
    QueryResponse, RankedMatch, RetrievalEngine,
};
pub use error::{IndexError, QueryError};
pub use fusion::{Signals, fuse};
pub use fuzzy::NameMatcher;
pub use index::{INDEX_FILE, INDEX_VERSION, LexicalIndex, build_index, document_text};
pub use tokenize::{tokenize, words};
