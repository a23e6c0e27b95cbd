//! Background replication.
//!
//! A [`SyncEngine`] pairs one kernel with one [`Replicator`]. Each round
//! pushes local nodes the backend has not seen from us, then pulls from the
//! last marker. Between rounds it follows both the backend's live feed and
//! the kernel's own insert events. Failures are logged and retried on the
//! next tick; local reads and writes never wait on the network.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use taskweave_dag::{NodeValidator, Origin};
use taskweave_types::{Node, NodeId};

use crate::config::SyncConfig;
use crate::error::KernelResult;
use crate::kernel::{IngestOutcome, TaskKernel};
use crate::replication::{Replicator, SyncMarker};

/// Counters for one push/pull round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncRound {
    pub pushed: usize,
    pub pulled: usize,
    pub added: usize,
    pub rejected: usize,
    pub refetched: usize,
}

pub struct SyncEngine {
    kernel: Arc<TaskKernel>,
    replicator: Arc<dyn Replicator>,
    config: SyncConfig,
    marker: Mutex<Option<SyncMarker>>,
    /// Ids the backend already has, as far as we know.
    shared: Mutex<HashSet<NodeId>>,
}

impl SyncEngine {
    pub fn new(kernel: Arc<TaskKernel>, replicator: Arc<dyn Replicator>) -> Self {
        let config = kernel.config().sync.clone();
        Self {
            kernel,
            replicator,
            config,
            marker: Mutex::new(None),
            shared: Mutex::new(HashSet::new()),
        }
    }

    pub fn marker(&self) -> Option<SyncMarker> {
        *self.marker.lock()
    }

    fn mark_shared<'a>(&self, nodes: impl IntoIterator<Item = &'a Node>) {
        self.shared.lock().extend(nodes.into_iter().map(|n| n.id.clone()));
    }

    /// Upload local nodes not yet shared. Nodes that would not pass as
    /// remote input (unsigned ones, say) are held back.
    pub async fn push_pending(&self) -> KernelResult<usize> {
        let pending: Vec<Node> = {
            let shared = self.shared.lock();
            self.kernel
                .nodes()
                .snapshot()
                .iter()
                .filter(|n| !shared.contains(&n.id))
                .cloned()
                .collect()
        };
        let validator = NodeValidator::new(self.kernel.config().validation.clone());
        let (ready, held): (Vec<Node>, Vec<Node>) = pending
            .into_iter()
            .partition(|n| validator.validate(n, Origin::Remote).is_valid());
        for node in &held {
            debug!(node = %node.id.short(), "held back from push");
        }
        if ready.is_empty() {
            return Ok(0);
        }

        let ack = self.replicator.push(&ready).await?;
        self.mark_shared(&ready);
        debug!(stored = ack.stored, duplicates = ack.duplicates, "pushed");
        Ok(ready.len())
    }

    /// Pull everything after the last marker and ingest it. Pruned
    /// ancestry a new branch depends on is fetched in the same call.
    pub async fn pull_once(&self) -> KernelResult<(usize, IngestOutcome)> {
        let since = self.marker();
        let batch = self.replicator.pull(since).await?;
        let pulled = batch.nodes.len();
        self.mark_shared(&batch.nodes);
        let mut outcome = self.kernel.ingest_remote(batch.nodes).await?;
        *self.marker.lock() = Some(batch.marker);

        if !outcome.refetch.is_empty() {
            let fetched = self.replicator.fetch(&outcome.refetch).await?;
            self.mark_shared(&fetched);
            let again = self.kernel.ingest_remote(fetched).await?;
            outcome.added += again.added;
            outcome.rejected.extend(again.rejected);
            outcome.refetch = again.refetch;
        }
        Ok((pulled, outcome))
    }

    /// One push, then one pull.
    pub async fn sync_once(&self) -> KernelResult<SyncRound> {
        let pushed = self.push_pending().await?;
        let refetch_before: BTreeSet<NodeId> = self.kernel.pruned();
        let (pulled, outcome) = self.pull_once().await?;
        let refetched = refetch_before.len().saturating_sub(self.kernel.pruned().len());
        let round = SyncRound {
            pushed,
            pulled,
            added: outcome.added,
            rejected: outcome.rejected.len(),
            refetched,
        };
        info!(
            pushed = round.pushed,
            pulled = round.pulled,
            added = round.added,
            rejected = round.rejected,
            refetched = round.refetched,
            "sync round"
        );
        Ok(round)
    }

    /// Run until the backend feed or the kernel's event channel closes.
    /// Does nothing when sync is disabled.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.enabled {
                info!("sync disabled");
                return;
            }
            self.run().await;
        })
    }

    async fn run(&self) {
        let mut remote = self.replicator.subscribe();
        let mut local = self.kernel.subscribe();
        let period = self.config.pull_interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        warn!(error = %e, "sync round failed");
                    }
                }
                batch = remote.recv() => match batch {
                    Ok(nodes) => {
                        self.mark_shared(&nodes);
                        if let Err(e) = self.kernel.ingest_remote(nodes).await {
                            warn!(error = %e, "ingest from feed failed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "backend feed lagged, pulling");
                        if let Err(e) = self.pull_once().await {
                            warn!(error = %e, "catch-up pull failed");
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                batch = local.recv() => match batch {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        if let Err(e) = self.push_pending().await {
                            warn!(error = %e, "push failed");
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!("sync stopped");
    }
}
