//! The kernel's in-memory node set.
//!
//! # Concurrency Model
//!
//! - parking_lot `RwLock` around an id index and an `Arc<Vec<Node>>`
//! - readers take a cheap `Arc` snapshot and replay without holding the lock
//! - writers copy-on-write only when a snapshot is still alive
//! - newly inserted nodes are broadcast to subscribers

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use taskweave_types::{Node, NodeId};

const EVENT_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    ids: HashSet<NodeId>,
    nodes: Arc<Vec<Node>>,
}

/// Append-only set of nodes, deduplicated by id.
pub struct NodeSet {
    inner: RwLock<Inner>,
    event_tx: broadcast::Sender<Vec<Node>>,
}

impl Default for NodeSet {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeSet {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            event_tx,
        }
    }

    /// Add nodes whose ids are not present yet. Returns the newly added
    /// ones, which are also broadcast.
    pub fn insert(&self, nodes: impl IntoIterator<Item = Node>) -> Vec<Node> {
        let added: Vec<Node> = {
            let mut inner = self.inner.write();
            let mut added = Vec::new();
            for node in nodes {
                if inner.ids.insert(node.id.clone()) {
                    added.push(node);
                }
            }
            if !added.is_empty() {
                Arc::make_mut(&mut inner.nodes).extend(added.iter().cloned());
            }
            added
        };
        if !added.is_empty() {
            // No subscribers is fine.
            let _ = self.event_tx.send(added.clone());
        }
        added
    }

    /// Drop nodes by id (local pruning). Returns how many were present.
    pub fn remove(&self, ids: &BTreeSet<NodeId>) -> usize {
        let mut inner = self.inner.write();
        let before = inner.nodes.len();
        inner.ids.retain(|id| !ids.contains(id));
        Arc::make_mut(&mut inner.nodes).retain(|n| !ids.contains(&n.id));
        before - inner.nodes.len()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.inner.read().ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current contents, in insertion order.
    pub fn snapshot(&self) -> Arc<Vec<Node>> {
        Arc::clone(&self.inner.read().nodes)
    }

    /// Receive every batch of newly inserted nodes.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Node>> {
        self.event_tx.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
