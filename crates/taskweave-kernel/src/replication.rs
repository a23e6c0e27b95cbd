//! Replication adapter.
//!
//! The backend is a relay: it stores and forwards wire nodes and never
//! interprets them. Peers validate everything they receive as remote input,
//! so a hostile or buggy backend can withhold nodes but cannot forge state.
//!
//! [`MemoryHub`] is an in-process backend for tests and simulations; each
//! peer talks to it through its own [`HubReplicator`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use taskweave_types::{Node, NodeId};

use crate::error::{KernelError, KernelResult};

const EVENT_CAPACITY: usize = 1024;

/// Opaque pull cursor handed out by the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncMarker(pub u64);

/// Nodes newer than a marker, and the marker to resume from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PullBatch {
    pub nodes: Vec<Node>,
    pub marker: SyncMarker,
}

/// Backend acknowledgement of a push.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Nodes the backend had not seen.
    pub stored: usize,
    /// Nodes it already held.
    pub duplicates: usize,
}

/// Transport to a replication backend.
#[async_trait]
pub trait Replicator: Send + Sync {
    /// Upload nodes. Idempotent per id.
    async fn push(&self, nodes: &[Node]) -> KernelResult<Ack>;

    /// Everything stored after `since` (`None` for everything).
    async fn pull(&self, since: Option<SyncMarker>) -> KernelResult<PullBatch>;

    /// Specific nodes by id, for re-fetching pruned ancestry. Unknown ids
    /// are skipped.
    async fn fetch(&self, ids: &BTreeSet<NodeId>) -> KernelResult<Vec<Node>>;

    /// Live feed of nodes as other peers push them.
    fn subscribe(&self) -> broadcast::Receiver<Vec<Node>>;
}

// ── In-process backend ──────────────────────────────────────────────────────

/// Shared in-memory relay.
pub struct MemoryHub {
    log: RwLock<Vec<Node>>,
    index: DashMap<NodeId, usize>,
    event_tx: broadcast::Sender<Vec<Node>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            log: RwLock::new(Vec::new()),
            index: DashMap::new(),
            event_tx,
        })
    }

    /// A new peer connection.
    pub fn connect(self: &Arc<Self>) -> HubReplicator {
        HubReplicator {
            hub: Arc::clone(self),
            online: AtomicBool::new(true),
        }
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, nodes: &[Node]) -> Ack {
        let mut ack = Ack::default();
        let mut fresh = Vec::new();
        {
            let mut log = self.log.write();
            for node in nodes {
                if self.index.contains_key(&node.id) {
                    ack.duplicates += 1;
                    continue;
                }
                self.index.insert(node.id.clone(), log.len());
                log.push(node.clone());
                fresh.push(node.clone());
            }
        }
        ack.stored = fresh.len();
        if !fresh.is_empty() {
            let _ = self.event_tx.send(fresh);
        }
        ack
    }

    fn since(&self, since: Option<SyncMarker>) -> PullBatch {
        let log = self.log.read();
        let start = since.map_or(0, |m| m.0 as usize).min(log.len());
        PullBatch {
            nodes: log[start..].to_vec(),
            marker: SyncMarker(log.len() as u64),
        }
    }

    fn lookup(&self, ids: &BTreeSet<NodeId>) -> Vec<Node> {
        let log = self.log.read();
        ids.iter()
            .filter_map(|id| self.index.get(id).map(|pos| *pos))
            .filter_map(|pos| log.get(pos).cloned())
            .collect()
    }
}

/// One peer's connection to a [`MemoryHub`]. Can be taken offline to
/// simulate partitions.
pub struct HubReplicator {
    hub: Arc<MemoryHub>,
    online: AtomicBool,
}

impl HubReplicator {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> KernelResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(KernelError::replication("backend unreachable"))
        }
    }
}

#[async_trait]
impl Replicator for HubReplicator {
    async fn push(&self, nodes: &[Node]) -> KernelResult<Ack> {
        self.ensure_online()?;
        Ok(self.hub.store(nodes))
    }

    async fn pull(&self, since: Option<SyncMarker>) -> KernelResult<PullBatch> {
        self.ensure_online()?;
        Ok(self.hub.since(since))
    }

    async fn fetch(&self, ids: &BTreeSet<NodeId>) -> KernelResult<Vec<Node>> {
        self.ensure_online()?;
        Ok(self.hub.lookup(ids))
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<Node>> {
        self.hub.event_tx.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
