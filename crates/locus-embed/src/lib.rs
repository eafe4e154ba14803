//! Locus Embed: embedding provider contract and the single-flight vector cache

pub mod cache;
pub mod error;
pub mod prewarm;
pub mod provider;
mod store;


pub use cache::{Embedding, EmbeddingCache, Provenance};
pub use error::{CacheError, ProviderError};
pub use prewarm::PrewarmReport;
pub use provider::{EmbeddingProvider, HashingEmbedder, cosine_similarity, node_text};
pub use store::EMBEDDINGS_FILE;
