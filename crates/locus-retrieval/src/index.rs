//! BM25 lexical index over graph nodes, with an on-disk snapshot

use crate::error::IndexError;
use crate::tokenize::tokenize;
use locus_core::{CodeNode, GraphStore, NodeId, RetrievalConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Index snapshot file inside the cache directory
pub const INDEX_FILE: &str = "lexical.bin";

/// Current snapshot format version
pub const INDEX_VERSION: u32 = 1;

/// Inverted index with the statistics BM25 needs.
///
/// Documents are stored in ascending id order, so an ordinal comparison is
/// an id comparison and score ties resolve by id for free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalIndex {
    k1: f64,
    b: f64,
    doc_ids: Vec<NodeId>,
    doc_lens: Vec<u32>,
    avg_doc_len: f64,
    /// term -> (ordinal, term frequency), ordinals ascending
    postings: BTreeMap<String, Vec<(u32, u32)>>,
}

/// Index every node in `store`.
pub fn build_index(store: &GraphStore, config: &RetrievalConfig) -> LexicalIndex {
    let index = LexicalIndex::from_documents(
        store.nodes().map(|node| (node.id.clone(), document_text(node))),
        config.bm25_k1,
        config.bm25_b,
    );
    tracing::debug!(
        documents = index.len(),
        terms = index.term_count(),
        avg_doc_len = index.avg_doc_len,
        "lexical index built"
    );
    index
}

/// The text a node is indexed under: name, qualified name, path and the
/// docstring/signature/argument metadata the indexer recorded.
pub fn document_text(node: &CodeNode) -> String {
    let mut parts: Vec<&str> = vec![node.name.as_str()];
    if let Some(qualified) = node.meta("qualified_name").filter(|q| *q != node.name) {
        parts.push(qualified);
    }
    let path = node.path_str();
    if let Some(path) = &path {
        parts.push(path);
    }
    for key in ["docstring", "signature", "args", "bases"] {
        if let Some(value) = node.meta(key) {
            parts.push(value);
        }
    }
    parts.join(" ")
}

impl LexicalIndex {
    /// Build from raw (id, text) pairs. A repeated id keeps its first text.
    pub fn from_documents<I>(documents: I, k1: f64, b: f64) -> Self
    where
        I: IntoIterator<Item = (NodeId, String)>,
    {
        let mut docs: Vec<(NodeId, Vec<String>)> = documents
            .into_iter()
            .map(|(id, text)| (id, tokenize(&text)))
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        docs.dedup_by(|later, first| later.0 == first.0);

        let mut postings: BTreeMap<String, Vec<(u32, u32)>> = BTreeMap::new();
        let mut doc_lens = Vec::with_capacity(docs.len());
        for (ordinal, (_, terms)) in docs.iter().enumerate() {
            let mut frequencies: BTreeMap<&str, u32> = BTreeMap::new();
            for term in terms {
                *frequencies.entry(term.as_str()).or_insert(0) += 1;
            }
            for (term, tf) in frequencies {
                postings
                    .entry(term.to_string())
                    .or_default()
                    .push((ordinal as u32, tf));
            }
            doc_lens.push(terms.len() as u32);
        }

        let total: u64 = doc_lens.iter().map(|len| u64::from(*len)).sum();
        let avg_doc_len = if docs.is_empty() {
            0.0
        } else {
            total as f64 / docs.len() as f64
        };
        LexicalIndex {
            k1,
            b,
            doc_ids: docs.into_iter().map(|(id, _)| id).collect(),
            doc_lens,
            avg_doc_len,
            postings,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn k1(&self) -> f64 {
        self.k1
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    pub fn avg_doc_len(&self) -> f64 {
        self.avg_doc_len
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.doc_ids.binary_search(id).is_ok()
    }

    /// Number of documents containing an (already normalised) term.
    pub fn doc_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    fn idf(&self, df: usize) -> f64 {
        let n = self.doc_ids.len() as f64;
        let df = df as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn term_weight(&self, tf: u32, doc_len: u32) -> f64 {
        let tf = f64::from(tf);
        let relative_len = if self.avg_doc_len > 0.0 {
            f64::from(doc_len) / self.avg_doc_len
        } else {
            1.0
        };
        tf * (self.k1 + 1.0) / (tf + self.k1 * (1.0 - self.b + self.b * relative_len))
    }

    /// Every document with a positive score, best first, ties by ascending id.
    /// Repeated query terms count once.
    pub fn scores(&self, query: &str) -> Vec<(NodeId, f64)> {
        let terms: BTreeSet<String> = tokenize(query).into_iter().collect();
        let mut accumulated: BTreeMap<u32, f64> = BTreeMap::new();
        for term in &terms {
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(list.len());
            for &(ordinal, tf) in list {
                let weight = idf * self.term_weight(tf, self.doc_lens[ordinal as usize]);
                *accumulated.entry(ordinal).or_insert(0.0) += weight;
            }
        }

        let mut ranked: Vec<(NodeId, f64)> = accumulated
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(ordinal, score)| (self.doc_ids[ordinal as usize].clone(), score))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// The `top_k` best documents for `query`.
    pub fn score(&self, query: &str, top_k: usize) -> Vec<(NodeId, f64)> {
        let mut ranked = self.scores(query);
        ranked.truncate(top_k);
        ranked
    }

    // ── Snapshot ───────────────────────────────────────────────────────────

    /// Write a bincode snapshot, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let bytes =
            bincode::serialize(&(INDEX_VERSION, self)).map_err(|e| IndexError::Encode(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes).map_err(|source| IndexError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), documents = self.len(), "lexical index saved");
        Ok(())
    }

    /// Read a snapshot written by [`LexicalIndex::save`].
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = std::fs::read(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let corrupt = |reason: String| IndexError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        let Some(version) = bytes.get(..4) else {
            return Err(corrupt("file too short".to_string()));
        };
        let mut raw = [0u8; 4];
        raw.copy_from_slice(version);
        let found = u32::from_le_bytes(raw);
        if found != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found,
                expected: INDEX_VERSION,
            });
        }
        let (_, index): (u32, LexicalIndex) =
            bincode::deserialize(&bytes).map_err(|e| corrupt(e.to_string()))?;
        index.check().map_err(corrupt)?;
        Ok(index)
    }

    fn check(&self) -> Result<(), String> {
        if self.doc_ids.len() != self.doc_lens.len() {
            return Err("document tables disagree in length".to_string());
        }
        if self.doc_ids.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("document ids are not strictly ascending".to_string());
        }
        let n = self.doc_ids.len();
        for (term, list) in &self.postings {
            if list.iter().any(|(ordinal, _)| *ordinal as usize >= n) {
                return Err(format!("posting for {term:?} points past the last document"));
            }
        }
        Ok(())
    }
}
