//! Tombstone accounting and prune planning.
//!
//! A tombstone lists the node it deletes and every ancestor of it, in replay
//! order, so a merged history is covered branch by branch. Chains from every
//! tombstone are unioned. A node is a *survivor* when it is in no chain, is
//! not a tombstone and does not descend from one. Survivors keep their whole
//! ancestry alive; a chain node may be pruned only when no survivor descends
//! from it.
//!
//! ```text
//! A ── B ── C ── ✝ [A,B,C]
//!      └─── D            D survives, so A and B stay; only C is prunable
//! ```

use std::collections::{BTreeSet, HashSet};

use taskweave_types::{Node, NodeId, NodePayload};

use crate::dag::NodeDag;
use crate::validate::ValidatedNode;

#[derive(Debug, Clone, Default)]
pub struct DeletionTracker {
    chains: Vec<Vec<NodeId>>,
    chained: HashSet<NodeId>,
    tombstones: HashSet<NodeId>,
    survivors: HashSet<NodeId>,
    live: HashSet<NodeId>,
}

impl DeletionTracker {
    /// Account for every tombstone among `nodes`.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a ValidatedNode>) -> Self {
        let dag = NodeDag::from_nodes(nodes);
        Self::from_dag(&dag)
    }

    pub fn from_dag(dag: &NodeDag) -> Self {
        let mut tracker = Self::default();

        let mut tombstone_ids: Vec<&NodeId> = Vec::new();
        for node in dag.nodes.values() {
            if let NodePayload::Delete(delete) = &node.payload {
                tombstone_ids.push(node.id());
                tracker.chained.extend(delete.ancestry.iter().cloned());
                tracker.chains.push(delete.ancestry.clone());
            }
        }
        tombstone_ids.sort();
        tracker.chains.sort();
        tracker.tombstones = tombstone_ids.iter().map(|id| (*id).clone()).collect();

        let mut buried: HashSet<NodeId> = HashSet::new();
        for id in &tombstone_ids {
            buried.extend(dag.descendants(id));
        }

        tracker.survivors = dag
            .nodes
            .keys()
            .filter(|id| {
                !tracker.chained.contains(*id)
                    && !tracker.tombstones.contains(*id)
                    && !buried.contains(*id)
            })
            .cloned()
            .collect();
        tracker.live = dag.ancestor_closure(tracker.survivors.iter());

        tracing::debug!(
            tombstones = tracker.tombstones.len(),
            survivors = tracker.survivors.len(),
            live = tracker.live.len(),
            "deletion accounting"
        );
        tracker
    }

    /// Survivor or ancestor of a survivor.
    pub fn is_live(&self, id: &NodeId) -> bool {
        self.live.contains(id)
    }

    pub fn is_tombstone(&self, id: &NodeId) -> bool {
        self.tombstones.contains(id)
    }

    pub fn live(&self) -> &HashSet<NodeId> {
        &self.live
    }

    pub fn survivors(&self) -> &HashSet<NodeId> {
        &self.survivors
    }

    pub fn tombstones(&self) -> BTreeSet<NodeId> {
        self.tombstones.iter().cloned().collect()
    }

    /// Live nodes plus tombstones: what storage must keep.
    pub fn retained(&self) -> BTreeSet<NodeId> {
        self.live.iter().chain(self.tombstones.iter()).cloned().collect()
    }

    /// Chain nodes no survivor depends on.
    pub fn prunable(&self) -> BTreeSet<NodeId> {
        self.chained
            .iter()
            .filter(|id| !self.live.contains(*id))
            .cloned()
            .collect()
    }

    /// Ancestors a peer must re-fetch after pruning `pruned_locally`, once
    /// `received` shows a surviving branch that depends on them.
    ///
    /// Each chain is an ancestor closure in replay order. Ancestors sort
    /// first, so the prefix of a chain up to a referenced id holds that id's
    /// whole ancestry, plus any concurrent nodes that sort earlier.
    pub fn refetch_needed<'a>(
        &self,
        received: impl IntoIterator<Item = &'a Node>,
        pruned_locally: &BTreeSet<NodeId>,
    ) -> BTreeSet<NodeId> {
        let mut needed = BTreeSet::new();
        for node in received {
            for parent in &node.parents {
                if !pruned_locally.contains(parent) {
                    continue;
                }
                for chain in &self.chains {
                    if let Some(pos) = chain.iter().position(|id| id == parent) {
                        needed.extend(
                            chain[..=pos]
                                .iter()
                                .filter(|id| pruned_locally.contains(*id))
                                .cloned(),
                        );
                    }
                }
                needed.insert(parent.clone());
            }
        }
        needed
    }
}

// ============================================================================
// Tests
// ============================================================================
