//! Persisted graph document and the on-disk cache directory

use crate::error::PersistError;
use crate::graph::GraphStore;
use crate::model::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Cache directory: .locus/
pub const CACHE_DIR: &str = ".locus";

/// Graph document file inside the cache directory
pub const GRAPH_FILE: &str = "graph.json";

/// Current document format version
pub const FORMAT_VERSION: u32 = 1;

/// Get the default cache directory for a source root
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Ensure cache directory exists
pub fn ensure_cache_dir(dir: &Path) -> Result<(), PersistError> {
    std::fs::create_dir_all(dir).map_err(|source| PersistError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Remove a cache directory and everything in it. Missing is fine.
pub fn clear_cache(dir: &Path) -> Result<bool, PersistError> {
    if !dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(dir).map_err(|source| PersistError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// How embeddings are written into a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingStorage {
    /// Store the cache key; vectors live in the embedding store.
    #[default]
    Reference,
    /// Store the vector in the node record. Meant for small graphs.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u32>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    /// Inline vector. `null` when inline storage is used but no vector exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Serialised form of a frozen graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub version: u32,
    pub generated_at: String,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphDocument {
    /// Snapshot a store. `lookup` supplies a vector for inline storage;
    /// it is not consulted for reference storage.
    pub fn from_store<F>(store: &GraphStore, storage: EmbeddingStorage, mut lookup: F) -> Self
    where
        F: FnMut(&NodeId) -> Option<Vec<f32>>,
    {
        let nodes = store
            .nodes()
            .map(|node| {
                let (embedding, embedding_key) = match storage {
                    EmbeddingStorage::Reference => (None, Some(node.id.to_string())),
                    EmbeddingStorage::Inline => (lookup(&node.id), None),
                };
                NodeRecord {
                    id: node.id.clone(),
                    name: node.name.clone(),
                    kind: node.kind,
                    path: node.path_str(),
                    line_start: node.line_start,
                    line_end: node.line_end,
                    metadata: node.metadata.clone(),
                    embedding,
                    embedding_key,
                }
            })
            .collect();

        let edges = store
            .edges()
            .map(|edge| EdgeRecord {
                source: edge.source.clone(),
                target: edge.target.clone(),
                kind: edge.kind,
                metadata: edge.metadata.clone(),
            })
            .collect();

        GraphDocument {
            version: FORMAT_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            nodes,
            edges,
        }
    }

    /// Rebuild a frozen store, re-validating every record.
    /// Any structural violation makes the whole document unusable.
    pub fn into_store(self) -> Result<GraphStore, PersistError> {
        if self.version != FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: self.version,
                expected: FORMAT_VERSION,
            });
        }

        let mut store = GraphStore::new();
        for record in self.nodes {
            if !record.kind.is_structural()
                && (record.line_start.is_none() || record.line_end.is_none())
            {
                return Err(PersistError::Corrupt(format!(
                    "{} node {} has no line range",
                    record.kind, record.id
                )));
            }
            let node = CodeNode {
                id: record.id,
                name: record.name,
                kind: record.kind,
                path: record.path.map(PathBuf::from),
                line_start: record.line_start,
                line_end: record.line_end,
                metadata: record.metadata,
            };
            store
                .add_node(node)
                .map_err(|e| PersistError::Corrupt(e.to_string()))?;
        }
        for record in self.edges {
            let edge = CodeEdge {
                source: record.source,
                target: record.target,
                kind: record.kind,
                metadata: record.metadata,
            };
            store
                .add_edge(edge)
                .map_err(|e| PersistError::Corrupt(e.to_string()))?;
        }
        store.freeze();
        Ok(store)
    }

    /// Inline vectors carried by the document, in node order.
    pub fn inline_embeddings(&self) -> impl Iterator<Item = (&NodeId, &[f32])> {
        self.nodes
            .iter()
            .filter_map(|record| record.embedding.as_deref().map(|v| (&record.id, v)))
    }
}

/// Write a store as JSON. The file is replaced atomically via rename.
pub fn save_graph(
    store: &GraphStore,
    path: &Path,
    storage: EmbeddingStorage,
    lookup: impl FnMut(&NodeId) -> Option<Vec<f32>>,
) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_cache_dir(parent)?;
    }
    let document = GraphDocument::from_store(store, storage, lookup);
    let json = serde_json::to_string_pretty(&document)?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|source| PersistError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(
        path = %path.display(),
        nodes = document.nodes.len(),
        edges = document.edges.len(),
        "graph document saved"
    );
    Ok(())
}

/// Read a document without building a store.
pub fn load_document(path: &Path) -> Result<GraphDocument, PersistError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| PersistError::Corrupt(e.to_string()))
}

/// Load a graph document and rebuild a frozen store.
pub fn load_graph(path: &Path) -> Result<GraphStore, PersistError> {
    let store = load_document(path)?.into_store()?;
    tracing::debug!(path = %path.display(), nodes = store.node_count(), "graph document loaded");
    Ok(store)
}
