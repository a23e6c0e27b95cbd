//! Arena index over a node set.
//!
//! Nodes are immutable and only ever point at older ids, so the graph is a
//! DAG by construction. The index keeps nodes keyed by content id plus a
//! children map built once per call; nothing owns anything cyclically.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use taskweave_types::NodeId;

use crate::validate::ValidatedNode;

/// Computed DAG index over validated nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeDag {
    /// Nodes without parents.
    pub roots: Vec<NodeId>,
    /// Children indexed by parent id.
    pub children: HashMap<NodeId, Vec<NodeId>>,
    /// All nodes indexed by id.
    pub nodes: HashMap<NodeId, ValidatedNode>,
}

impl NodeDag {
    /// Build the index. Duplicate ids keep the first occurrence.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a ValidatedNode>) -> Self {
        let mut dag = Self::default();
        for node in nodes {
            if dag.nodes.contains_key(node.id()) {
                continue;
            }
            if node.parents().is_empty() {
                dag.roots.push(node.id().clone());
            }
            for parent in node.parents() {
                dag.children
                    .entry(parent.clone())
                    .or_default()
                    .push(node.id().clone());
            }
            dag.nodes.insert(node.id().clone(), node.clone());
        }
        for kids in dag.children.values_mut() {
            kids.sort();
        }
        dag.roots.sort();
        dag
    }

    pub fn get(&self, id: &NodeId) -> Option<&ValidatedNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Known children of a node (sorted by id).
    pub fn get_children(&self, id: &NodeId) -> &[NodeId] {
        self.children.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Strict ancestors of `id` that are present in the index.
    pub fn ancestors(&self, id: &NodeId) -> HashSet<NodeId> {
        let start = self
            .nodes
            .get(id)
            .map(|n| n.parents().to_vec())
            .unwrap_or_default();
        self.walk(start, |n| self.nodes.get(n).map(|v| v.parents()).unwrap_or(&[]))
    }

    /// `ids` plus all of their known ancestors.
    pub fn ancestor_closure<'a>(&self, ids: impl IntoIterator<Item = &'a NodeId>) -> HashSet<NodeId> {
        let start: Vec<NodeId> = ids.into_iter().cloned().collect();
        self.walk(start, |n| self.nodes.get(n).map(|v| v.parents()).unwrap_or(&[]))
    }

    /// Strict descendants of `id`.
    pub fn descendants(&self, id: &NodeId) -> HashSet<NodeId> {
        self.walk(self.get_children(id).to_vec(), |n| self.get_children(n))
    }

    /// True when `ancestor` is reachable from `id` through parent links.
    pub fn is_ancestor(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        self.ancestors(id).contains(ancestor)
    }

    /// Members of `set` with no child inside `set`, sorted.
    pub fn heads_within(&self, set: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut heads: Vec<NodeId> = set
            .iter()
            .filter(|id| !self.get_children(id).iter().any(|c| set.contains(c)))
            .cloned()
            .collect();
        heads.sort();
        heads
    }

    /// Closure ordered for replay.
    pub fn ordered<'a>(&'a self, ids: &HashSet<NodeId>) -> Vec<&'a ValidatedNode> {
        let mut out: Vec<&ValidatedNode> = ids.iter().filter_map(|id| self.nodes.get(id)).collect();
        out.sort_by(|a, b| a.order.cmp(&b.order));
        out
    }

    /// All ids, sorted.
    pub fn ids(&self) -> BTreeSet<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    /// Breadth-first visit. `seen` bounds it by the index size.
    fn walk<'a, F>(&'a self, start: Vec<NodeId>, next: F) -> HashSet<NodeId>
    where
        F: Fn(&NodeId) -> &'a [NodeId],
    {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeId> = start.into();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            queue.extend(next(&id).iter().cloned());
        }
        seen
    }
}

// ============================================================================
// Tests
// ============================================================================
