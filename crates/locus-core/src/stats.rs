//! Derived graph summary

use crate::graph::{Direction, GraphStore};
use crate::model::{EdgeKind, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;

/// Read-only summary of a graph. Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_counts: BTreeMap<NodeKind, usize>,
    pub edge_counts: BTreeMap<EdgeKind, usize>,
    /// Number of Contains edges on the longest root-to-leaf chain.
    pub max_depth: usize,
}

impl GraphStore {
    pub fn stats(&self) -> GraphStats {
        let mut node_counts = BTreeMap::new();
        for node in self.nodes() {
            *node_counts.entry(node.kind).or_insert(0) += 1;
        }
        let mut edge_counts = BTreeMap::new();
        for edge in self.edges() {
            *edge_counts.entry(edge.kind).or_insert(0) += 1;
        }

        GraphStats {
            total_nodes: self.node_count(),
            total_edges: self.edge_count(),
            node_counts,
            edge_counts,
            max_depth: self.contains_depth(),
        }
    }

    /// Breadth-first over Contains edges only. The visited set keeps this
    /// finite even if a hand-built store violates the forest shape.
    fn contains_depth(&self) -> usize {
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut queue: VecDeque<(&NodeId, usize)> = VecDeque::new();
        for root in self.roots() {
            if visited.insert(&root.id) {
                queue.push_back((&root.id, 0));
            }
        }

        let mut max_depth = 0;
        while let Some((id, depth)) = queue.pop_front() {
            max_depth = max_depth.max(depth);
            for edge in self.get_edges(id, Some(EdgeKind::Contains), Direction::Outgoing) {
                if visited.insert(&edge.target) {
                    queue.push_back((&edge.target, depth + 1));
                }
            }
        }
        max_depth
    }
}

impl fmt::Display for GraphStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nodes: {}", self.total_nodes)?;
        for (kind, count) in &self.node_counts {
            writeln!(f, "  {kind:<10} {count}")?;
        }
        writeln!(f, "edges: {}", self.total_edges)?;
        for (kind, count) in &self.edge_counts {
            writeln!(f, "  {kind:<10} {count}")?;
        }
        write!(f, "max depth: {}", self.max_depth)
    }
}
