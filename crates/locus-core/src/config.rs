//! Configuration loading (TOML, YAML or JSON) with environment overrides

use crate::error::ConfigError;
use crate::model::{EdgeKind, NodeKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocusConfig {
    pub graph: GraphConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
}

/// Controls how a source tree becomes a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub node_types: Vec<NodeKind>,
    pub edge_types: Vec<EdgeKind>,
    /// Glob patterns matched against a directory's own name.
    pub skip_dirs: Vec<String>,
    /// Extensions with or without the leading dot.
    pub file_extensions: Vec<String>,
    pub max_depth: usize,
    /// Files larger than this many bytes are recorded as skipped.
    pub max_file_size: u64,
    /// Skip a file's analysis when its parse tree contains syntax errors.
    pub strict_syntax: bool,
    pub respect_gitignore: bool,
    /// Analysis worker threads; 0 picks the rayon default.
    pub threads: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            node_types: NodeKind::ALL.to_vec(),
            edge_types: EdgeKind::ALL.to_vec(),
            skip_dirs: [".git", ".github", "__pycache__", ".pytest_cache", "node_modules"]
                .map(String::from)
                .to_vec(),
            file_extensions: [".py", ".js", ".ts", ".java", ".cpp", ".c", ".h"]
                .map(String::from)
                .to_vec(),
            max_depth: 10,
            max_file_size: 1024 * 1024,
            strict_syntax: true,
            respect_gitignore: false,
            threads: 0,
        }
    }
}

impl GraphConfig {
    pub fn node_enabled(&self, kind: NodeKind) -> bool {
        self.node_types.contains(&kind)
    }

    pub fn edge_enabled(&self, kind: EdgeKind) -> bool {
        self.edge_types.contains(&kind)
    }

    /// Directory/File nodes and Contains edges are mandatory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for required in [NodeKind::Directory, NodeKind::File] {
            if !self.node_enabled(required) {
                return Err(ConfigError::invalid(
                    "graph.node_types",
                    format!("{required} nodes cannot be disabled"),
                ));
            }
        }
        if !self.edge_enabled(EdgeKind::Contains) {
            return Err(ConfigError::invalid(
                "graph.edge_types",
                "contains edges cannot be disabled",
            ));
        }
        if self.file_extensions.is_empty() {
            return Err(ConfigError::invalid("graph.file_extensions", "must not be empty"));
        }
        Ok(())
    }

    /// True if `ext` (no dot) is one of the configured extensions.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.file_extensions
            .iter()
            .any(|configured| configured.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

/// How a candidate's name is compared to the query text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzyMetric {
    /// max(normalised Levenshtein ratio, token overlap)
    #[default]
    EditDistance,
    /// skim-style subsequence match, normalised by the query's self score
    Subsequence,
}

/// How per-signal scores are combined into one ranking score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FusionStrategy {
    WeightedSum {
        lexical: f64,
        fuzzy: f64,
        embedding: f64,
    },
    ReciprocalRank {
        k: f64,
    },
}

impl Default for FusionStrategy {
    fn default() -> Self {
        FusionStrategy::WeightedSum {
            lexical: 0.5,
            fuzzy: 0.3,
            embedding: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub bm25_k1: f64,
    pub bm25_b: f64,
    pub top_k: usize,
    pub fuzzy_threshold: f64,
    pub fuzzy_metric: FuzzyMetric,
    pub fusion: FusionStrategy,
    pub cache_dir: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            bm25_k1: 1.2,
            bm25_b: 0.75,
            top_k: 10,
            fuzzy_threshold: 0.8,
            fuzzy_metric: FuzzyMetric::default(),
            fusion: FusionStrategy::default(),
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub dimension: usize,
    pub prewarm_concurrency: usize,
    /// Block a query on missing embeddings for at most this long.
    /// `None` means queries only use vectors already in the cache.
    pub on_demand_timeout_ms: Option<u64>,
    /// Give up on embedding the query text after this long when only cached
    /// vectors are used; the query then ranks without the embedding signal.
    pub query_timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            enabled: true,
            dimension: 256,
            prewarm_concurrency: 8,
            on_demand_timeout_ms: None,
            query_timeout_ms: 500,
        }
    }
}

impl LocusConfig {
    /// Load a config file by extension, then apply `LOCUS_*` overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parse_err = |reason: String| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        };
        let mut config: LocusConfig = match ext.as_str() {
            "toml" => toml::from_str(&raw).map_err(|e| parse_err(e.to_string()))?,
            "yaml" | "yml" => serde_yaml::from_str(&raw).map_err(|e| parse_err(e.to_string()))?,
            "json" => serde_json::from_str(&raw).map_err(|e| parse_err(e.to_string()))?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Defaults plus `LOCUS_*` overrides, for runs without a config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = LocusConfig::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable source. Taking a closure keeps tests
    /// independent of the process environment.
    pub fn apply_env_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("LOCUS_MAX_DEPTH") {
            self.graph.max_depth = v
                .parse()
                .map_err(|_| ConfigError::invalid("LOCUS_MAX_DEPTH", format!("not an integer: {v}")))?;
        }
        if let Some(v) = var("LOCUS_TOP_K") {
            self.retrieval.top_k = v
                .parse()
                .map_err(|_| ConfigError::invalid("LOCUS_TOP_K", format!("not an integer: {v}")))?;
        }
        if let Some(v) = var("LOCUS_FUZZY_THRESHOLD") {
            self.retrieval.fuzzy_threshold = v.parse().map_err(|_| {
                ConfigError::invalid("LOCUS_FUZZY_THRESHOLD", format!("not a number: {v}"))
            })?;
        }
        if let Some(v) = var("LOCUS_CACHE_DIR") {
            self.retrieval.cache_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.graph.validate()?;

        let r = &self.retrieval;
        if !(r.bm25_k1.is_finite() && r.bm25_k1 >= 0.0) {
            return Err(ConfigError::invalid("retrieval.bm25_k1", "must be >= 0"));
        }
        if !(0.0..=1.0).contains(&r.bm25_b) {
            return Err(ConfigError::invalid("retrieval.bm25_b", "must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&r.fuzzy_threshold) {
            return Err(ConfigError::invalid(
                "retrieval.fuzzy_threshold",
                "must be within [0, 1]",
            ));
        }
        if r.top_k == 0 {
            return Err(ConfigError::invalid("retrieval.top_k", "must be > 0"));
        }
        match r.fusion {
            FusionStrategy::WeightedSum { lexical, fuzzy, embedding } => {
                if [lexical, fuzzy, embedding].iter().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err(ConfigError::invalid(
                        "retrieval.fusion",
                        "weights must be non-negative",
                    ));
                }
            }
            FusionStrategy::ReciprocalRank { k } => {
                if !k.is_finite() || k < 0.0 {
                    return Err(ConfigError::invalid("retrieval.fusion", "k must be >= 0"));
                }
            }
        }

        if self.embedding.enabled && self.embedding.dimension == 0 {
            return Err(ConfigError::invalid("embedding.dimension", "must be > 0"));
        }
        if self.embedding.query_timeout_ms == 0 {
            return Err(ConfigError::invalid("embedding.query_timeout_ms", "must be > 0"));
        }
        if self.embedding.prewarm_concurrency == 0 {
            return Err(ConfigError::invalid(
                "embedding.prewarm_concurrency",
                "must be > 0",
            ));
        }
        Ok(())
    }

    /// Where caches for `root` live: the configured directory or `<root>/.locus`.
    pub fn cache_dir_for(&self, root: &Path) -> PathBuf {
        self.retrieval
            .cache_dir
            .clone()
            .unwrap_or_else(|| crate::persist::cache_dir(root))
    }
}
