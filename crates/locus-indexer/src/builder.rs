//! Graph construction: walk, parallel per-file analysis, single-writer merge

use crate::error::BuildError;
use crate::extractor::{FileOutline, first_error_line};
use crate::languages::get_extractor;
use crate::parser::{self, SourceLanguage};
use crate::resolve::{ModuleIndex, SymbolTable};
use crate::walk::{WalkedFile, walk};
use locus_core::{CodeEdge, CodeNode, Context, EdgeKind, GraphConfig, GraphStore, NodeId, NodeKind};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::Span;

/// A file whose analysis was abandoned. Its File node is still in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct BuildOutput {
    /// Frozen.
    pub graph: GraphStore,
    pub skipped: Vec<SkippedFile>,
}

/// Outcome of analysing one file on a worker thread.
enum Analysis {
    Outline(FileOutline),
    /// Extension is configured but no extractor exists for it.
    Unsupported,
    Skipped(String),
}

pub struct GraphBuilder {
    config: GraphConfig,
    span: Span,
}

impl GraphBuilder {
    pub fn new(ctx: &Context, config: GraphConfig) -> Self {
        GraphBuilder {
            config,
            span: ctx.component("builder"),
        }
    }

    /// Build a frozen graph for `root`.
    ///
    /// Per-file failures are collected in [`BuildOutput::skipped`]; only a bad
    /// root, a bad config or an internal invariant violation aborts the build.
    pub fn build(&self, root: &Path) -> Result<BuildOutput, BuildError> {
        let _guard = self.span.enter();
        self.config.validate()?;
        if !root.exists() {
            return Err(BuildError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(BuildError::NotADirectory(root.to_path_buf()));
        }

        let walked = walk(root, &self.config)?;
        let mut skipped: Vec<SkippedFile> = walked
            .errors
            .iter()
            .map(|(path, reason)| SkippedFile {
                path: path.display().to_string(),
                reason: reason.clone(),
            })
            .collect();

        let mut store = GraphStore::new();
        for dir in &walked.directories {
            store.add_node(CodeNode::directory(dir))?;
            link_to_parent(&mut store, dir)?;
        }
        for file in &walked.files {
            let mut node = CodeNode::file(&file.rel_path);
            if let Some(language) = SourceLanguage::from_extension(&file.extension) {
                node = node.with_metadata("language", language.name());
            }
            store.add_node(node)?;
            link_to_parent(&mut store, &file.rel_path)?;
        }

        let analyses = self.analyze(&walked.files)?;
        let mut outlines: Vec<(&WalkedFile, FileOutline)> = Vec::new();
        for (file, analysis) in walked.files.iter().zip(analyses) {
            match analysis {
                Analysis::Outline(outline) => outlines.push((file, outline)),
                Analysis::Unsupported => {}
                Analysis::Skipped(reason) => {
                    tracing::warn!(path = %file.rel_path, %reason, "file analysis skipped");
                    skipped.push(SkippedFile {
                        path: file.rel_path.clone(),
                        reason,
                    });
                }
            }
        }

        Merger::new(&self.config, &mut store).merge(&walked.files, &outlines)?;
        store.freeze();

        let stats = store.stats();
        tracing::info!(
            root = %root.display(),
            nodes = stats.total_nodes,
            edges = stats.total_edges,
            skipped = skipped.len(),
            "graph built"
        );
        Ok(BuildOutput {
            graph: store,
            skipped,
        })
    }

    /// Analyse files in parallel. Output order matches input order.
    fn analyze(&self, files: &[WalkedFile]) -> Result<Vec<Analysis>, BuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| BuildError::ThreadPool(e.to_string()))?;
        let config = &self.config;
        let span = &self.span;
        Ok(pool.install(|| {
            files
                .par_iter()
                .map(|file| span.in_scope(|| analyze_file(file, config)))
                .collect()
        }))
    }
}

/// Build a graph with a detached context.
pub fn build(root: &Path, config: &GraphConfig) -> Result<BuildOutput, BuildError> {
    GraphBuilder::new(&Context::detached(), config.clone()).build(root)
}

fn link_to_parent(store: &mut GraphStore, rel_path: &str) -> Result<(), BuildError> {
    if let Some((parent, _)) = rel_path.rsplit_once('/') {
        store.add_edge(CodeEdge::new(
            NodeId::for_path(parent),
            NodeId::for_path(rel_path),
            EdgeKind::Contains,
        ))?;
    }
    Ok(())
}

fn analyze_file(file: &WalkedFile, config: &GraphConfig) -> Analysis {
    let Some(language) = SourceLanguage::from_extension(&file.extension) else {
        return Analysis::Unsupported;
    };
    match std::fs::metadata(&file.abs_path) {
        Ok(meta) if meta.len() > config.max_file_size => {
            return Analysis::Skipped(format!(
                "file too large: {} bytes (limit {})",
                meta.len(),
                config.max_file_size
            ));
        }
        Ok(_) => {}
        Err(e) => return Analysis::Skipped(format!("cannot stat file: {e}")),
    }
    let bytes = match std::fs::read(&file.abs_path) {
        Ok(bytes) => bytes,
        Err(e) => return Analysis::Skipped(format!("cannot read file: {e}")),
    };
    let Ok(source) = String::from_utf8(bytes) else {
        return Analysis::Skipped("file is not valid UTF-8".to_string());
    };
    let tree = match parser::parse(language, &source) {
        Ok(tree) => tree,
        Err(reason) => return Analysis::Skipped(reason),
    };
    let root = tree.root_node();
    if config.strict_syntax {
        if let Some(line) = first_error_line(root) {
            return Analysis::Skipped(format!("{language} syntax error at line {line}"));
        }
    }
    tracing::trace!(path = %file.rel_path, %language, "file parsed");
    Analysis::Outline(get_extractor(language).extract(root, source.as_bytes()))
}

/// Single-writer merge of all per-file outlines into the store.
struct Merger<'a> {
    config: &'a GraphConfig,
    store: &'a mut GraphStore,
    seen_edges: HashSet<(NodeId, NodeId, EdgeKind)>,
}

impl<'a> Merger<'a> {
    fn new(config: &'a GraphConfig, store: &'a mut GraphStore) -> Self {
        Merger {
            config,
            store,
            seen_edges: HashSet::new(),
        }
    }

    fn merge(
        mut self,
        all_files: &[WalkedFile],
        outlines: &[(&WalkedFile, FileOutline)],
    ) -> Result<(), BuildError> {
        // classes and functions, with their Contains edges
        let mut emitted: Vec<Vec<Option<NodeId>>> = Vec::with_capacity(outlines.len());
        let mut symbols = SymbolTable::default();
        for (file, outline) in outlines {
            let ids = self.add_symbols(file, outline)?;
            for (symbol, id) in outline.symbols.iter().zip(&ids) {
                if let Some(id) = id {
                    let parent = nearest_emitted(outline, &ids, symbol.parent);
                    symbols.insert(&file.rel_path, &symbol.name, id.clone(), symbol.kind, parent);
                }
            }
            emitted.push(ids);
        }

        // imports
        let modules = ModuleIndex::new(all_files.iter().map(|f| f.rel_path.as_str()));
        let mut imported: HashMap<&str, Vec<String>> = HashMap::new();
        for (file, outline) in outlines {
            let mut targets: Vec<String> = outline
                .imports
                .iter()
                .flat_map(|import| modules.resolve(&file.rel_path, import))
                .collect();
            targets.sort();
            targets.dedup();
            for target in &targets {
                self.relate(
                    NodeId::for_path(&file.rel_path),
                    NodeId::for_path(target),
                    EdgeKind::Imports,
                )?;
            }
            imported.insert(file.rel_path.as_str(), targets);
        }

        // inheritance and invocation
        for ((file, outline), ids) in outlines.iter().zip(&emitted) {
            let file_imports = imported
                .get(file.rel_path.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            for (symbol, id) in outline.symbols.iter().zip(ids) {
                let Some(id) = id else { continue };
                let scope = nearest_emitted(outline, ids, symbol.parent);
                for base in &symbol.bases {
                    let target = symbols.resolve(
                        base,
                        &[NodeKind::Class],
                        &file.rel_path,
                        file_imports,
                        None,
                        Some(id),
                    );
                    if let Some(target) = target {
                        self.relate(id.clone(), target, EdgeKind::Inherits)?;
                    }
                }
                if symbol.kind != NodeKind::Function {
                    continue;
                }
                for call in &symbol.calls {
                    let target = symbols.resolve(
                        call,
                        &[NodeKind::Function, NodeKind::Class],
                        &file.rel_path,
                        file_imports,
                        scope.as_ref(),
                        None,
                    );
                    if let Some(target) = target {
                        self.relate(id.clone(), target, EdgeKind::Invokes)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Emit class/function nodes for one file. Returns each symbol's id, or
    /// `None` when its kind is disabled.
    fn add_symbols(
        &mut self,
        file: &WalkedFile,
        outline: &FileOutline,
    ) -> Result<Vec<Option<NodeId>>, BuildError> {
        let mut ids: Vec<Option<NodeId>> = Vec::with_capacity(outline.symbols.len());
        let mut occurrences: HashMap<&str, usize> = HashMap::new();

        for symbol in &outline.symbols {
            if !self.config.node_enabled(symbol.kind) {
                ids.push(None);
                continue;
            }
            let count = occurrences.entry(symbol.qualified_name.as_str()).or_insert(0);
            *count += 1;
            let id = match *count {
                1 => NodeId::for_symbol(&file.rel_path, &symbol.qualified_name),
                n => NodeId::for_symbol(&file.rel_path, &format!("{}#{n}", symbol.qualified_name)),
            };

            let mut node = CodeNode::symbol(
                id.clone(),
                symbol.kind,
                &symbol.name,
                &file.rel_path,
                symbol.line_start,
                symbol.line_end,
            )
            .with_metadata("qualified_name", &symbol.qualified_name);
            if let Some(doc) = &symbol.docstring {
                node = node.with_metadata("docstring", doc);
            }
            if let Some(signature) = &symbol.signature {
                node = node.with_metadata("signature", signature);
            }
            if !symbol.args.is_empty() {
                node = node.with_metadata("args", symbol.args.join(", "));
            }
            if !symbol.bases.is_empty() {
                node = node.with_metadata("bases", symbol.bases.join(", "));
            }
            self.store.add_node(node)?;

            let container = nearest_emitted(outline, &ids, symbol.parent)
                .unwrap_or_else(|| NodeId::for_path(&file.rel_path));
            self.store
                .add_edge(CodeEdge::new(container, id.clone(), EdgeKind::Contains))?;
            ids.push(Some(id));
        }
        Ok(ids)
    }

    /// Add a relation edge once, if its kind is enabled.
    fn relate(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) -> Result<(), BuildError> {
        if !self.config.edge_enabled(kind) {
            return Ok(());
        }
        if self.seen_edges.insert((source.clone(), target.clone(), kind)) {
            self.store.add_edge(CodeEdge::new(source, target, kind))?;
        }
        Ok(())
    }
}

/// Walk up the symbol parents until one that produced a node.
fn nearest_emitted(
    outline: &FileOutline,
    ids: &[Option<NodeId>],
    mut parent: Option<usize>,
) -> Option<NodeId> {
    while let Some(idx) = parent {
        if let Some(Some(id)) = ids.get(idx) {
            return Some(id.clone());
        }
        parent = outline.symbols[idx].parent;
    }
    None
}
