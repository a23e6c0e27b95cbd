//! Local node log.
//!
//! The log is a dumb append-only bag of wire nodes. It does not validate
//! anything; whatever it returns is revalidated before replay.

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use taskweave_types::{Node, NodeId};

use crate::error::KernelResult;

/// Durable storage for nodes.
#[async_trait]
pub trait NodeLog: Send + Sync {
    /// Persist one node. Appending an id that is already stored is a no-op
    /// and returns `false`.
    async fn append(&self, node: &Node) -> KernelResult<bool>;

    /// Every stored node, in append order.
    async fn read_all(&self) -> KernelResult<Vec<Node>>;

    /// Drop nodes by id; returns how many were stored.
    async fn remove(&self, ids: &BTreeSet<NodeId>) -> KernelResult<usize>;

    /// Persist several nodes; returns how many were new.
    async fn append_all(&self, nodes: &[Node]) -> KernelResult<usize> {
        let mut added = 0;
        for node in nodes {
            if self.append(node).await? {
                added += 1;
            }
        }
        Ok(added)
    }
}

/// In-memory log, for tests and ephemeral kernels.
#[derive(Debug, Default)]
pub struct MemoryLog {
    nodes: Mutex<Vec<Node>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    fn contains(nodes: &[Node], id: &NodeId) -> bool {
        nodes.iter().any(|n| &n.id == id)
    }
}

#[async_trait]
impl NodeLog for MemoryLog {
    async fn append(&self, node: &Node) -> KernelResult<bool> {
        let mut nodes = self.nodes.lock();
        if Self::contains(&nodes, &node.id) {
            return Ok(false);
        }
        nodes.push(node.clone());
        Ok(true)
    }

    async fn read_all(&self) -> KernelResult<Vec<Node>> {
        Ok(self.nodes.lock().clone())
    }

    async fn remove(&self, ids: &BTreeSet<NodeId>) -> KernelResult<usize> {
        let mut nodes = self.nodes.lock();
        let before = nodes.len();
        nodes.retain(|n| !ids.contains(&n.id));
        Ok(before - nodes.len())
    }
}

// ============================================================================
// Tests
// ============================================================================
