//! Navigation queries over a built graph
//!
//! These answer the questions an agent asks once it has a candidate node:
//! where is it defined, what does it depend on, what depends on it, and
//! how are two nodes connected.

use crate::graph::{Direction, GraphStore};
use crate::model::*;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Relations grouped by edge kind. Contains is never included.
pub type RelationMap<'a> = BTreeMap<EdgeKind, Vec<&'a CodeNode>>;

/// Classes and functions defined in one file.
#[derive(Debug, Default)]
pub struct FileEntities<'a> {
    pub classes: Vec<&'a CodeNode>,
    /// Functions nested directly in a class, keyed by the class id.
    pub methods: BTreeMap<NodeId, Vec<&'a CodeNode>>,
    /// Top-level and nested functions not owned by a class.
    pub functions: Vec<&'a CodeNode>,
}

impl GraphStore {
    /// Nodes whose name equals `name` exactly, sorted by id.
    pub fn find_by_name(&self, name: &str) -> Vec<&CodeNode> {
        let mut found: Vec<&CodeNode> = self.nodes().filter(|n| n.name == name).collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    /// All nodes of one kind, sorted by id.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&CodeNode> {
        let mut found: Vec<&CodeNode> = self.nodes().filter(|n| n.kind == kind).collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    /// The Directory or File node for a root-relative path.
    pub fn node_by_path(&self, rel_path: &str) -> Option<&CodeNode> {
        let key = rel_path.trim_start_matches("./").trim_end_matches('/');
        self.get_node(&NodeId::for_path(key))
            .filter(|node| node.kind.is_structural())
    }

    /// Targets of outgoing non-Contains edges.
    pub fn dependencies(&self, id: &NodeId) -> RelationMap<'_> {
        self.relations(id, Direction::Outgoing)
    }

    /// Sources of incoming non-Contains edges.
    pub fn dependents(&self, id: &NodeId) -> RelationMap<'_> {
        self.relations(id, Direction::Incoming)
    }

    fn relations(&self, id: &NodeId, direction: Direction) -> RelationMap<'_> {
        let mut map: RelationMap<'_> = BTreeMap::new();
        for edge in self.get_edges(id, None, direction) {
            if edge.kind == EdgeKind::Contains {
                continue;
            }
            let other = match direction {
                Direction::Incoming => &edge.source,
                _ => &edge.target,
            };
            if let Some(node) = self.get_node(other) {
                let bucket = map.entry(edge.kind).or_default();
                if !bucket.iter().any(|n| n.id == node.id) {
                    bucket.push(node);
                }
            }
        }
        map
    }

    /// Every node one edge away in either direction, any kind, sorted by id.
    pub fn neighbors(&self, id: &NodeId) -> Vec<&CodeNode> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for edge in self.get_edges(id, None, Direction::Both) {
            let other = if &edge.source == id { &edge.target } else { &edge.source };
            if other != id && seen.insert(other) {
                if let Some(node) = self.get_node(other) {
                    out.push(node);
                }
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// The immediate Contains parent.
    pub fn container_of(&self, id: &NodeId) -> Option<&CodeNode> {
        self.parent_of(id)
    }

    /// The nearest File ancestor of a class or function (or the node itself
    /// if it is a file).
    pub fn source_file_of(&self, id: &NodeId) -> Option<&CodeNode> {
        let node = self.get_node(id)?;
        if node.kind == NodeKind::File {
            return Some(node);
        }
        self.ancestors_of(id)
            .into_iter()
            .find(|ancestor| ancestor.kind == NodeKind::File)
    }

    /// Classes, their methods, and free functions defined in a file.
    pub fn file_entities(&self, rel_path: &str) -> Option<FileEntities<'_>> {
        let file = self
            .node_by_path(rel_path)
            .filter(|n| n.kind == NodeKind::File)?;

        let mut entities = FileEntities::default();
        let mut stack: Vec<&CodeNode> = self.children_of(&file.id);
        stack.reverse();
        while let Some(node) = stack.pop() {
            match node.kind {
                NodeKind::Class => entities.classes.push(node),
                NodeKind::Function => {
                    match self.parent_of(&node.id) {
                        Some(parent) if parent.kind == NodeKind::Class => {
                            entities.methods.entry(parent.id.clone()).or_default().push(node)
                        }
                        _ => entities.functions.push(node),
                    }
                }
                _ => continue,
            }
            let mut children = self.children_of(&node.id);
            children.reverse();
            stack.extend(children);
        }
        Some(entities)
    }

    /// Shortest directed path from `from` to `to` over any edge kind,
    /// at most `max_len` edges long. Returns the node ids along the path.
    pub fn shortest_path(&self, from: &NodeId, to: &NodeId, max_len: usize) -> Option<Vec<NodeId>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(vec![from.clone()]);
        }

        let mut previous: HashMap<&NodeId, &NodeId> = HashMap::new();
        let mut visited: HashSet<&NodeId> = HashSet::from([from]);
        let mut queue: VecDeque<(&NodeId, usize)> = VecDeque::from([(from, 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_len {
                continue;
            }
            for edge in self.get_edges(current, None, Direction::Outgoing) {
                if !visited.insert(&edge.target) {
                    continue;
                }
                previous.insert(&edge.target, current);
                if &edge.target == to {
                    let mut path = vec![to.clone()];
                    let mut cursor = to;
                    while let Some(&prev) = previous.get(cursor) {
                        path.push(prev.clone());
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back((&edge.target, depth + 1));
            }
        }
        None
    }
}
