//! The task kernel.
//!
//! Owns the node set, persists it through a [`NodeLog`], originates new
//! nodes for the local author and replays on demand. State is never cached:
//! every read reconstructs from the current snapshot.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use taskweave_cas::{Signer, seal};
use taskweave_dag::{
    DeletionTracker, NodeDag, NodeValidator, Origin, Reconstruction, Reconstructor, RejectReason,
    ReplayReport, ValidatedNode, ValidationOutcome, next_clock, rank_entities,
};
use taskweave_types::{
    Author, DeletePayload, Entity, FieldValue, MergeField, MergePayload, MergeStrategy, Node,
    NodeDraft, NodeId, NodePayload, TaskId, Timestamp, WallClock,
};

use crate::config::KernelConfig;
use crate::db::SqliteLog;
use crate::error::{KernelError, KernelResult};
use crate::node_set::NodeSet;
use crate::storage::{MemoryLog, NodeLog};

/// What happened to a batch of remote nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub added: usize,
    pub duplicates: usize,
    /// Structurally invalid nodes, never stored.
    pub rejected: Vec<(NodeId, RejectReason)>,
    /// Locally pruned ancestors the new nodes depend on.
    pub refetch: BTreeSet<NodeId>,
}

/// An owned entity with its display score.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedEntity {
    pub entity: Entity,
    pub score: f64,
}

pub struct TaskKernel {
    config: KernelConfig,
    validator: NodeValidator,
    signer: Arc<dyn Signer>,
    log: Arc<dyn NodeLog>,
    nodes: NodeSet,
    pruned: RwLock<BTreeSet<NodeId>>,
}

impl TaskKernel {
    /// Open the log named by the config (memory when no path is set) and
    /// load it.
    pub async fn open(config: KernelConfig, signer: Arc<dyn Signer>) -> KernelResult<Self> {
        let log: Arc<dyn NodeLog> = match &config.storage.path {
            Some(path) => Arc::new(SqliteLog::open(path)?),
            None => Arc::new(MemoryLog::new()),
        };
        Self::with_log(config, signer, log).await
    }

    pub async fn with_log(
        config: KernelConfig,
        signer: Arc<dyn Signer>,
        log: Arc<dyn NodeLog>,
    ) -> KernelResult<Self> {
        let kernel = Self {
            validator: NodeValidator::new(config.validation.clone()),
            config,
            signer,
            log,
            nodes: NodeSet::new(),
            pruned: RwLock::new(BTreeSet::new()),
        };
        let loaded = kernel.load().await?;
        info!(
            device = %kernel.config.device_id,
            identity = %kernel.signer.public_key().identity(),
            loaded,
            "task kernel ready"
        );
        Ok(kernel)
    }

    /// Stored data is revalidated; anything invalid is dropped, not trusted.
    async fn load(&self) -> KernelResult<usize> {
        let stored = self.log.read_all().await?;
        let mut keep = Vec::with_capacity(stored.len());
        for node in stored {
            match self.validator.validate(&node, Origin::Local) {
                ValidationOutcome::Valid(_) => keep.push(node),
                ValidationOutcome::Rejected(reason) => {
                    warn!(node = %node.id.short(), reason = reason.as_str(), "discarding invalid stored node");
                }
            }
        }
        Ok(self.nodes.insert(keep).len())
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    /// Batches of nodes as they enter the set, local or remote.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Node>> {
        self.nodes.subscribe()
    }

    /// The author stamped on locally originated nodes.
    pub fn author(&self) -> Author {
        Author::new(
            self.signer.public_key(),
            self.config.device_id.clone(),
            self.config.display_name.clone(),
        )
    }

    // ── Reads ───────────────────────────────────────────────────────────────

    pub fn reconstruct(&self) -> Reconstruction {
        Reconstructor::new(self.validator.clone()).reconstruct(&self.nodes.snapshot())
    }

    pub fn entities(&self) -> BTreeMap<TaskId, Entity> {
        self.reconstruct().entities
    }

    pub fn entity(&self, task: &TaskId) -> Option<Entity> {
        self.entities().remove(task)
    }

    pub fn report(&self) -> ReplayReport {
        self.reconstruct().report
    }

    /// Entities by descending rank at `now`.
    pub fn ranked(&self, now: WallClock) -> Vec<RankedEntity> {
        let entities = self.entities();
        rank_entities(entities.values(), now)
            .into_iter()
            .map(|r| RankedEntity {
                entity: r.entity.clone(),
                score: r.score,
            })
            .collect()
    }

    // ── Origination ─────────────────────────────────────────────────────────

    /// Author a node now. CREATE has no parents, MERGE joins every live
    /// head, anything else extends the tallest live head.
    pub async fn originate(&self, task: &TaskId, payload: NodePayload) -> KernelResult<Node> {
        let parents = match &payload {
            NodePayload::Create(_) => {
                if self.entity(task).is_some() {
                    return Err(KernelError::Rejected(RejectReason::DuplicateGenesis));
                }
                Vec::new()
            }
            NodePayload::Merge(_) => {
                let heads = self.require_entity(task)?.heads;
                if heads.len() < 2 {
                    return Err(KernelError::Rejected(RejectReason::SchemaMismatch));
                }
                heads
            }
            _ => {
                let entity = self.require_entity(task)?;
                vec![self.tallest_head(&entity)?]
            }
        };
        self.originate_at(task, parents, payload, WallClock::now()).await
    }

    /// Author a node with explicit parents and wall clock. The node is
    /// refused, and nothing is stored, if it would not survive replay.
    pub async fn originate_at(
        &self,
        task: &TaskId,
        parents: Vec<NodeId>,
        payload: NodePayload,
        wall: WallClock,
    ) -> KernelResult<Node> {
        let snapshot = self.nodes.snapshot();
        let mut clocks = Vec::with_capacity(parents.len());
        for parent in &parents {
            let clock = snapshot
                .iter()
                .find(|n| &n.id == parent)
                .map(|n| n.timestamp.logical_clock)
                .ok_or(KernelError::Rejected(RejectReason::DanglingParent))?;
            clocks.push(clock);
        }

        let draft = NodeDraft {
            parents,
            timestamp: Timestamp::new(next_clock(clocks), wall),
            author: self.author(),
            action: payload.action(),
            task_id: task.clone(),
            payload: payload.to_map()?,
        };
        let node = seal(draft, Some(self.signer.as_ref()))?;

        if let Some(reason) = self.validator.validate(&node, Origin::Local).reason() {
            return Err(KernelError::Rejected(reason));
        }
        let mut trial: Vec<Node> = snapshot.iter().filter(|n| &n.task_id == task).cloned().collect();
        trial.push(node.clone());
        let outcome = Reconstructor::new(self.validator.clone()).reconstruct(&trial);
        if let Some(rejection) = outcome.report.rejection(&node.id) {
            return Err(KernelError::Rejected(rejection.reason));
        }

        self.log.append(&node).await?;
        self.nodes.insert([node.clone()]);
        debug!(
            node = %node.id.short(),
            task = %task.short(),
            action = node.action.as_str(),
            clock = node.timestamp.logical_clock,
            "originated"
        );
        Ok(node)
    }

    /// Tombstone the entity: the ancestry is the tallest live head and
    /// every ancestor of it, merged branches included, in replay order.
    pub async fn delete(&self, task: &TaskId) -> KernelResult<Node> {
        let entity = self.require_entity(task)?;
        let head = self.tallest_head(&entity)?;
        let dag = self.task_dag(task);
        let ancestry: Vec<NodeId> = dag
            .ordered(&dag.ancestor_closure([&head]))
            .into_iter()
            .map(|n| n.id().clone())
            .collect();
        self.originate_at(
            task,
            vec![head],
            NodePayload::Delete(DeletePayload { ancestry, ext: None }),
            WallClock::now(),
        )
        .await
    }

    /// Join every live head. The base is their latest common ancestor.
    pub async fn merge_heads(
        &self,
        task: &TaskId,
        strategy: MergeStrategy,
        resolutions: BTreeMap<MergeField, FieldValue>,
    ) -> KernelResult<Node> {
        let entity = self.require_entity(task)?;
        if entity.heads.len() < 2 {
            return Err(KernelError::Rejected(RejectReason::SchemaMismatch));
        }
        let dag = self.task_dag(task);
        let mut common: Option<HashSet<NodeId>> = None;
        for head in &entity.heads {
            let ancestors = dag.ancestors(head);
            common = Some(match common {
                None => ancestors,
                Some(acc) => acc.intersection(&ancestors).cloned().collect(),
            });
        }
        let base = common
            .unwrap_or_default()
            .iter()
            .filter_map(|id| dag.get(id))
            .max_by(|a, b| a.order.cmp(&b.order))
            .map(|n| n.id().clone())
            .ok_or(KernelError::Rejected(RejectReason::InvalidMergeBase))?;

        let resolutions = resolutions
            .into_iter()
            .map(|(field, value)| Ok((field, serde_json::to_value(value)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        self.originate_at(
            task,
            entity.heads.clone(),
            NodePayload::Merge(MergePayload {
                base,
                strategy,
                resolutions,
                ext: None,
            }),
            WallClock::now(),
        )
        .await
    }

    fn require_entity(&self, task: &TaskId) -> KernelResult<Entity> {
        self.entity(task)
            .ok_or_else(|| KernelError::UnknownTask(task.to_string()))
    }

    fn tallest_head(&self, entity: &Entity) -> KernelResult<NodeId> {
        let dag = self.task_dag(&entity.task_id);
        entity
            .heads
            .iter()
            .filter_map(|id| dag.get(id))
            .max_by(|a, b| a.order.cmp(&b.order))
            .map(|n| n.id().clone())
            .ok_or_else(|| KernelError::UnknownTask(entity.task_id.to_string()))
    }

    fn validated(&self, nodes: &[Node], task: Option<&TaskId>) -> Vec<ValidatedNode> {
        nodes
            .iter()
            .filter(|n| task.is_none_or(|t| &n.task_id == t))
            .filter_map(|n| self.validator.validate(n, Origin::Local).into_result().ok())
            .collect()
    }

    fn task_dag(&self, task: &TaskId) -> NodeDag {
        NodeDag::from_nodes(&self.validated(&self.nodes.snapshot(), Some(task)))
    }

    // ── Remote input and pruning ────────────────────────────────────────────

    /// Validate remote nodes, store the new valid ones. Invalid nodes are
    /// logged and reported, never stored.
    pub async fn ingest_remote(&self, nodes: Vec<Node>) -> KernelResult<IngestOutcome> {
        let mut outcome = IngestOutcome::default();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut fresh = Vec::new();
        for node in nodes {
            if self.nodes.contains(&node.id) || !seen.insert(node.id.clone()) {
                outcome.duplicates += 1;
                continue;
            }
            match self.validator.validate(&node, Origin::Remote) {
                ValidationOutcome::Valid(_) => fresh.push(node),
                ValidationOutcome::Rejected(reason) => {
                    warn!(
                        node = %node.id.short(),
                        task = %node.task_id.short(),
                        reason = reason.as_str(),
                        "rejected remote node"
                    );
                    outcome.rejected.push((node.id.clone(), reason));
                }
            }
        }
        if fresh.is_empty() {
            return Ok(outcome);
        }

        self.log.append_all(&fresh).await?;
        let added = self.nodes.insert(fresh);
        outcome.added = added.len();

        let pruned = self.pruned.read().clone();
        if !pruned.is_empty() {
            let returned: BTreeSet<NodeId> = added.iter().map(|n| n.id.clone()).collect();
            self.pruned.write().retain(|id| !returned.contains(id));
            let tracker = DeletionTracker::from_nodes(&self.validated(&self.nodes.snapshot(), None));
            outcome.refetch = tracker
                .refetch_needed(added.iter(), &pruned)
                .into_iter()
                .filter(|id| !self.nodes.contains(id))
                .collect();
            if !outcome.refetch.is_empty() {
                info!(count = outcome.refetch.len(), "divergent branch needs pruned ancestry");
            }
        }
        Ok(outcome)
    }

    /// Drop deleted history no survivor depends on, from the log and the
    /// set. Tombstones are kept.
    pub async fn prune(&self) -> KernelResult<BTreeSet<NodeId>> {
        let prunable = self.report().prunable;
        if prunable.is_empty() {
            return Ok(prunable);
        }
        self.log.remove(&prunable).await?;
        self.nodes.remove(&prunable);
        self.pruned.write().extend(prunable.iter().cloned());
        info!(count = prunable.len(), "pruned deleted history");
        Ok(prunable)
    }

    /// Ids dropped by [`prune`](Self::prune) and not re-fetched since.
    pub fn pruned(&self) -> BTreeSet<NodeId> {
        self.pruned.read().clone()
    }
}
