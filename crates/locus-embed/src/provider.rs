//! Embedding provider contract and the offline hashing provider

use crate::error::ProviderError;
use async_trait::async_trait;
use locus_core::CodeNode;
use regex::Regex;
use std::sync::LazyLock;

/// Anything that turns text into fixed-size vectors.
///
/// Implementations must be deterministic per `id()`: the cache keys vectors
/// by node, not by provider, so switching providers means clearing the cache.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed a batch. The result has one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let vectors = self.embed(&[text.to_string()]).await?;
        let got = vectors.len();
        match vectors.into_iter().next() {
            Some(vector) if got == 1 => Ok(vector),
            _ => Err(ProviderError::BatchSize { expected: 1, got }),
        }
    }
}

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]?[a-z0-9]+|[A-Z]+").unwrap());

/// Feature-hashing embedder: unigrams and adjacent bigrams of the text's
/// words are hashed into signed buckets, then L2-normalised.
///
/// No model and no network, so the whole pipeline runs offline.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        HashingEmbedder {
            dimension: dimension.max(1),
        }
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let words: Vec<String> = WORD
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        let mut vector = vec![0.0f32; self.dimension];
        for word in &words {
            self.add_feature(&mut vector, word.as_bytes(), 1.0);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, bigram.as_bytes(), 0.5);
        }
        normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn id(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// The text embedded for a node: its name, kind, location and any
/// signature or docstring the indexer recorded.
pub fn node_text(node: &CodeNode) -> String {
    let mut parts = vec![node.name.clone(), node.kind.to_string()];
    if let Some(qualified) = node.meta("qualified_name") {
        if qualified != node.name {
            parts.push(qualified.to_string());
        }
    }
    if let Some(path) = node.path_str() {
        parts.push(path);
    }
    for key in ["signature", "docstring"] {
        if let Some(value) = node.meta(key) {
            parts.push(value.to_string());
        }
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["parseConfig reads files".to_string(), String::new()];
        let first = embedder.embed(&texts).await.unwrap();
        let second = embedder.embed(&texts).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 64);

        let norm: f32 = first[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(first[1].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_similar_text_scores_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.vectorize("parse config");
        let close = embedder.vectorize("parseConfig loads the config file");
        let far = embedder.vectorize("render widget tree");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) < 0.0);
    }

    #[test]
    fn test_node_text_includes_metadata() {
        let graph = locus_core::test_utils::sample_graph();
        let bar = graph.get_node(&locus_core::NodeId::from("pkg/a.py::bar")).unwrap();
        let text = node_text(bar);
        assert!(text.starts_with("bar\nfunction"));
        assert!(text.contains("pkg/a.py"));
        assert!(text.contains("def bar(path)"));
    }
}
