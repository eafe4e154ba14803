//! Graph store wrapping petgraph::StableDiGraph with string node ids

use crate::error::GraphError;
use crate::model::*;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// Which side of a node to look at when listing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

/// The code graph: a directed multigraph with an id index.
///
/// A store starts out mutable. [`GraphStore::freeze`] makes it read-only; after
/// that it is typically wrapped in an `Arc` and shared with any number of readers.
pub struct GraphStore {
    inner: StableDiGraph<CodeNode, CodeEdge>,
    index: HashMap<NodeId, NodeIndex>,
    frozen: bool,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        GraphStore {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
            frozen: false,
        }
    }

    /// Add a node. Fails on a frozen store, a duplicate id, or an inverted line range.
    pub fn add_node(&mut self, node: CodeNode) -> Result<(), GraphError> {
        if self.frozen {
            return Err(GraphError::Frozen);
        }
        if let (Some(start), Some(end)) = (node.line_start, node.line_end) {
            if start > end {
                return Err(GraphError::InvalidLineRange {
                    id: node.id.clone(),
                    start,
                    end,
                });
            }
        }
        if self.index.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode { id: node.id });
        }
        let id = node.id.clone();
        let idx = self.inner.add_node(node);
        self.index.insert(id, idx);
        Ok(())
    }

    /// Add an edge. Both endpoints must already be present.
    ///
    /// Contains edges keep the hierarchy a forest: a node gets at most one
    /// parent, and never one of its own descendants.
    pub fn add_edge(&mut self, edge: CodeEdge) -> Result<(), GraphError> {
        if self.frozen {
            return Err(GraphError::Frozen);
        }
        let source = self.lookup(&edge.source)?;
        let target = self.lookup(&edge.target)?;
        if edge.kind == EdgeKind::Contains {
            if self.parent_of(&edge.target).is_some() {
                return Err(GraphError::MultipleParents { id: edge.target });
            }
            if edge.source == edge.target
                || self.ancestors_of(&edge.source).iter().any(|a| a.id == edge.target)
            {
                return Err(GraphError::ContainsCycle {
                    parent: edge.source,
                    child: edge.target,
                });
            }
        }
        self.inner.add_edge(source, target, edge);
        Ok(())
    }

    fn lookup(&self, id: &NodeId) -> Result<NodeIndex, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownEndpoint { id: id.clone() })
    }

    /// Make the store immutable. Calling it again is a no-op.
    pub fn freeze(&mut self) {
        if !self.frozen {
            tracing::debug!(
                nodes = self.inner.node_count(),
                edges = self.inner.edge_count(),
                "graph store frozen"
            );
            self.frozen = true;
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Get a node by id.
    pub fn get_node(&self, id: &NodeId) -> Option<&CodeNode> {
        self.index.get(id).and_then(|&idx| self.inner.node_weight(idx))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &CodeNode> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    /// Iterate over all edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &CodeEdge> {
        self.inner
            .edge_indices()
            .filter_map(move |idx| self.inner.edge_weight(idx))
    }

    /// Edges touching `id`, optionally restricted to one kind.
    /// Sorted by (source, target, kind) so callers see a stable order.
    pub fn get_edges(
        &self,
        id: &NodeId,
        edge_type: Option<EdgeKind>,
        direction: Direction,
    ) -> Vec<&CodeEdge> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&CodeEdge> = Vec::new();
        let mut collect = |dir: petgraph::Direction| {
            edges.extend(
                self.inner
                    .edges_directed(idx, dir)
                    .map(|edge_ref| edge_ref.weight())
                    .filter(|edge| edge_type.is_none_or(|kind| edge.kind == kind)),
            );
        };
        match direction {
            Direction::Outgoing => collect(petgraph::Direction::Outgoing),
            Direction::Incoming => collect(petgraph::Direction::Incoming),
            Direction::Both => {
                collect(petgraph::Direction::Outgoing);
                collect(petgraph::Direction::Incoming);
            }
        }
        edges.sort_by(|a, b| {
            (&a.source, &a.target, a.kind).cmp(&(&b.source, &b.target, b.kind))
        });
        edges
    }

    /// Check if an edge of `kind` exists from `source` to `target`.
    pub fn has_edge_between(&self, source: &NodeId, target: &NodeId, kind: EdgeKind) -> bool {
        self.get_edges(source, Some(kind), Direction::Outgoing)
            .iter()
            .any(|e| &e.target == target)
    }

    /// Direct children along Contains edges, sorted by id.
    pub fn children_of(&self, id: &NodeId) -> Vec<&CodeNode> {
        let mut children: Vec<&CodeNode> = self
            .get_edges(id, Some(EdgeKind::Contains), Direction::Outgoing)
            .into_iter()
            .filter_map(|edge| self.get_node(&edge.target))
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        children
    }

    /// The node's Contains parent, if it is not a root.
    pub fn parent_of(&self, id: &NodeId) -> Option<&CodeNode> {
        let idx = *self.index.get(id)?;
        self.inner
            .edges_directed(idx, petgraph::Direction::Incoming)
            .find(|edge_ref| edge_ref.weight().kind == EdgeKind::Contains)
            .and_then(|edge_ref| self.inner.node_weight(edge_ref.source()))
    }

    /// Contains ancestors, nearest first, ending at the root.
    pub fn ancestors_of(&self, id: &NodeId) -> Vec<&CodeNode> {
        let mut ancestors = Vec::new();
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            if !seen.insert(&parent.id) {
                break;
            }
            ancestors.push(parent);
            current = &parent.id;
        }
        ancestors
    }

    /// Nodes with no incoming Contains edge, sorted by id.
    pub fn roots(&self) -> Vec<&CodeNode> {
        let mut roots: Vec<&CodeNode> = self
            .inner
            .node_indices()
            .filter(|&idx| {
                !self
                    .inner
                    .edges_directed(idx, petgraph::Direction::Incoming)
                    .any(|edge_ref| edge_ref.weight().kind == EdgeKind::Contains)
            })
            .filter_map(|idx| self.inner.node_weight(idx))
            .collect();
        roots.sort_by(|a, b| a.id.cmp(&b.id));
        roots
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
