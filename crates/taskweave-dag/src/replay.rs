//! Deterministic state reconstruction.
//!
//! Replay is a pure function of the node set:
//!
//! 1. validate every node structurally and drop duplicate ids
//! 2. sort by [`OrderKey`](taskweave_types::OrderKey)
//! 3. **admission**: fold in order, checking parents, clocks and the
//!    cross-node rules each action carries. A node that breaks a rule becomes
//!    a poison root for its task; anything whose parents touch a poisoned id
//!    is a broken branch. Ancestors and sibling branches are untouched.
//!    A tombstone left alone after its history was pruned is set aside as
//!    detached.
//! 4. tombstone accounting over the admitted nodes ([`DeletionTracker`])
//! 5. **materialize**: fold the admitted, live nodes into entity state
//!
//! Every rejection lands in the [`ReplayReport`] for diagnostics; callers
//! only ever see reconstructed entities.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use taskweave_types::{
    Entity, FieldValue, Item, MILLIS_PER_DAY, MergeField, Metadata, Node, NodeId, NodePayload,
    TaskId, WallClock,
};

use crate::dag::NodeDag;
use crate::deletion::DeletionTracker;
use crate::merge::{MergeInput, MergeSide, resolve};
use crate::order::sort_nodes;
use crate::validate::{NodeValidator, Origin, RejectReason, ValidatedNode, ValidationOutcome};

/// Which pass refused a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Structural,
    Replay,
}

/// One refused node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub node: NodeId,
    pub task: TaskId,
    pub reason: RejectReason,
    pub stage: Stage,
    /// For broken branches, the rejected ancestor that poisoned this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poison_root: Option<NodeId>,
}

/// Forensic record of a replay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Sorted by node id, then stage.
    pub rejections: Vec<Rejection>,
    /// Extra copies of an id already accepted.
    pub duplicates: usize,
    /// Nodes that passed admission.
    pub admitted: usize,
    /// Admitted nodes that are deleted or are tombstones.
    pub inactive: BTreeSet<NodeId>,
    /// Nodes storage may drop.
    pub prunable: BTreeSet<NodeId>,
    /// Tombstones whose deleted history is already pruned. Neither admitted
    /// nor rejected.
    #[serde(default)]
    pub detached: BTreeSet<NodeId>,
}

impl ReplayReport {
    pub fn rejection(&self, id: &NodeId) -> Option<&Rejection> {
        self.rejections.iter().find(|r| &r.node == id)
    }

    pub fn is_rejected(&self, id: &NodeId) -> bool {
        self.rejection(id).is_some()
    }

    /// Rejection counts per reason, for logs and metrics.
    pub fn counts(&self) -> BTreeMap<RejectReason, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.rejections {
            *counts.entry(r.reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Result of a replay.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconstruction {
    pub entities: BTreeMap<TaskId, Entity>,
    pub report: ReplayReport,
}

/// Replay with the default validator and local origin.
pub fn reconstruct(nodes: &[Node]) -> BTreeMap<TaskId, Entity> {
    Reconstructor::default().reconstruct(nodes).entities
}

/// Replay engine. Holds configuration only; every call starts from scratch.
#[derive(Clone, Debug, Default)]
pub struct Reconstructor {
    validator: NodeValidator,
    origin: Origin,
}

impl Reconstructor {
    pub fn new(validator: NodeValidator) -> Self {
        Self {
            validator,
            origin: Origin::Local,
        }
    }

    /// Treat input as remote: unsigned nodes are rejected.
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn reconstruct(&self, nodes: &[Node]) -> Reconstruction {
        let mut report = ReplayReport::default();
        let mut poisoned: HashMap<TaskId, HashMap<NodeId, NodeId>> = HashMap::new();

        // ── 1. Structural validation ───────────────────────────────────────
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut valid: Vec<ValidatedNode> = Vec::with_capacity(nodes.len());
        let mut structural: Vec<&Node> = Vec::new();
        for node in nodes {
            match self.validator.validate(node, self.origin) {
                ValidationOutcome::Valid(v) => {
                    if seen.insert(v.id().clone()) {
                        valid.push(v);
                    } else {
                        report.duplicates += 1;
                    }
                }
                ValidationOutcome::Rejected(reason) => {
                    tracing::debug!(
                        node = %node.id.short(),
                        task = %node.task_id.short(),
                        reason = reason.as_str(),
                        "structural rejection"
                    );
                    report.rejections.push(Rejection {
                        node: node.id.clone(),
                        task: node.task_id.clone(),
                        reason,
                        stage: Stage::Structural,
                        poison_root: None,
                    });
                    structural.push(node);
                }
            }
        }
        // A rejected copy does not poison an id that also arrived intact.
        for node in structural {
            if !seen.contains(&node.id) {
                poisoned
                    .entry(node.task_id.clone())
                    .or_default()
                    .insert(node.id.clone(), node.id.clone());
            }
        }

        // ── 2. Total order ─────────────────────────────────────────────────
        sort_nodes(&mut valid);
        let dag = NodeDag::from_nodes(&valid);
        let genesis = choose_genesis(&valid, &dag);
        let mut replayer = Replayer::new(&dag, &genesis);

        // ── 3. Admission ───────────────────────────────────────────────────
        let mut admitted: HashSet<NodeId> = HashSet::new();
        let mut admitted_order: Vec<&ValidatedNode> = Vec::new();
        let mut accumulators: HashMap<TaskId, Option<Entity>> = HashMap::new();

        for node in &valid {
            let task = &node.node.task_id;
            let poison = poisoned.entry(task.clone()).or_default();

            if let Some(root) = node.parents().iter().find_map(|p| poison.get(p)).cloned() {
                tracing::debug!(
                    node = %node.id().short(),
                    task = %task.short(),
                    root = %root.short(),
                    "broken branch"
                );
                poison.insert(node.id().clone(), root.clone());
                report.rejections.push(Rejection {
                    node: node.id().clone(),
                    task: task.clone(),
                    reason: RejectReason::BrokenBranch,
                    stage: Stage::Replay,
                    poison_root: Some(root),
                });
                continue;
            }

            if is_detached_tombstone(node, &dag) {
                tracing::debug!(
                    node = %node.id().short(),
                    task = %task.short(),
                    "tombstone over pruned history"
                );
                report.detached.insert(node.id().clone());
                continue;
            }

            let state = accumulators.entry(task.clone()).or_default();
            let verdict = check_parents(node, &dag, &admitted).and_then(|()| replayer.apply(state, node));
            match verdict {
                Ok(()) => {
                    admitted.insert(node.id().clone());
                    admitted_order.push(node);
                }
                Err(reason) => {
                    tracing::debug!(
                        node = %node.id().short(),
                        task = %task.short(),
                        reason = reason.as_str(),
                        "replay rejection"
                    );
                    poison.insert(node.id().clone(), node.id().clone());
                    report.rejections.push(Rejection {
                        node: node.id().clone(),
                        task: task.clone(),
                        reason,
                        stage: Stage::Replay,
                        poison_root: None,
                    });
                }
            }
        }
        report.admitted = admitted_order.len();

        // ── 4. Tombstones ──────────────────────────────────────────────────
        let tracker = DeletionTracker::from_nodes(admitted_order.iter().copied());
        report.prunable = tracker.prunable();

        // ── 5. Materialize ─────────────────────────────────────────────────
        let mut states: BTreeMap<TaskId, Option<Entity>> = BTreeMap::new();
        let mut live_by_task: HashMap<TaskId, HashSet<NodeId>> = HashMap::new();
        for node in admitted_order {
            if !tracker.is_live(node.id()) {
                report.inactive.insert(node.id().clone());
                continue;
            }
            let task = &node.node.task_id;
            live_by_task
                .entry(task.clone())
                .or_default()
                .insert(node.id().clone());
            let state = states.entry(task.clone()).or_default();
            if let Err(reason) = replayer.apply(state, node) {
                tracing::debug!(
                    node = %node.id().short(),
                    task = %task.short(),
                    reason = reason.as_str(),
                    "skipped while materializing"
                );
            }
        }

        let mut entities = BTreeMap::new();
        for (task, state) in states {
            let Some(mut entity) = state else { continue };
            if let Some(live) = live_by_task.get(&task) {
                entity.heads = dag.heads_within(live);
            }
            entities.insert(task, entity);
        }

        report
            .rejections
            .sort_by(|a, b| a.node.cmp(&b.node).then(a.stage.cmp(&b.stage)));
        Reconstruction { entities, report }
    }
}

/// One genesis per task: among competing CREATE nodes, one that other nodes
/// build on beats a childless one; ties go to the first in total order.
fn choose_genesis(sorted: &[ValidatedNode], dag: &NodeDag) -> HashMap<TaskId, NodeId> {
    let mut chosen: HashMap<TaskId, (bool, NodeId)> = HashMap::new();
    for node in sorted {
        if !node.node.is_genesis() {
            continue;
        }
        let task = &node.node.task_id;
        let anchored = dag.get_children(node.id()).iter().any(|child| {
            dag.get(child)
                .is_some_and(|c| &c.node.task_id == task)
        });
        match chosen.get(task) {
            None => {
                chosen.insert(task.clone(), (anchored, node.id().clone()));
            }
            Some((false, _)) if anchored => {
                chosen.insert(task.clone(), (true, node.id().clone()));
            }
            Some(_) => {}
        }
    }
    chosen.into_iter().map(|(task, (_, id))| (task, id)).collect()
}

/// A tombstone none of whose parent or ancestry ids are present.
fn is_detached_tombstone(node: &ValidatedNode, dag: &NodeDag) -> bool {
    let NodePayload::Delete(delete) = &node.payload else {
        return false;
    };
    node.parents()
        .iter()
        .chain(&delete.ancestry)
        .all(|id| !dag.contains(id))
}

/// Parents must be admitted, in the same task, and the clock must be
/// exactly one past the highest parent.
fn check_parents(
    node: &ValidatedNode,
    dag: &NodeDag,
    admitted: &HashSet<NodeId>,
) -> Result<(), RejectReason> {
    let mut max_parent = 0;
    for parent_id in node.parents() {
        let Some(parent) = dag.get(parent_id) else {
            return Err(RejectReason::DanglingParent);
        };
        if parent.node.task_id != node.node.task_id {
            return Err(RejectReason::DanglingParent);
        }
        if !admitted.contains(parent_id) {
            // Known and unpoisoned but not yet replayed: it sorts after us.
            return Err(RejectReason::CausalClockViolation);
        }
        max_parent = max_parent.max(parent.clock());
    }
    if !node.parents().is_empty() && node.clock() != max_parent + 1 {
        return Err(RejectReason::CausalClockViolation);
    }
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// Applies nodes to an entity accumulator. Caches branch states for merges.
struct Replayer<'a> {
    dag: &'a NodeDag,
    genesis: &'a HashMap<TaskId, NodeId>,
    branch_states: HashMap<NodeId, Option<Entity>>,
}

impl<'a> Replayer<'a> {
    fn new(dag: &'a NodeDag, genesis: &'a HashMap<TaskId, NodeId>) -> Self {
        Self {
            dag,
            genesis,
            branch_states: HashMap::new(),
        }
    }

    /// Dispatch one node. On error the state is left untouched.
    fn apply(&mut self, state: &mut Option<Entity>, node: &ValidatedNode) -> Result<(), RejectReason> {
        if let NodePayload::Create(create) = &node.payload {
            let is_chosen = self.genesis.get(&node.node.task_id) == Some(node.id());
            if state.is_some() || !is_chosen {
                return Err(RejectReason::DuplicateGenesis);
            }
            *state = Some(Entity {
                task_id: node.node.task_id.clone(),
                genesis: node.id().clone(),
                created_by: node.node.author.identity_id.clone(),
                created_at: node.wall(),
                metadata: Metadata {
                    title: create.title.trim().to_string(),
                    priority: create.priority,
                    complexity: create.complexity,
                    recurrence_days: create.recurrence_days,
                    private: create.private,
                    tags: create.tags.clone(),
                    archived: false,
                },
                ext: create.ext.clone(),
                items: Vec::new(),
                pending_conflicts: BTreeSet::new(),
                heads: Vec::new(),
            });
            return Ok(());
        }

        let Some(entity) = state.as_mut() else {
            return Err(RejectReason::DanglingParent);
        };

        match &node.payload {
            NodePayload::Create(_) => Err(RejectReason::DuplicateGenesis),
            NodePayload::Update(patch) => {
                if patch.private.is_some() && node.node.author.identity_id != entity.created_by {
                    return Err(RejectReason::ForbiddenField);
                }
                let m = &mut entity.metadata;
                if let Some(title) = &patch.title {
                    m.title = title.trim().to_string();
                }
                if let Some(priority) = patch.priority {
                    m.priority = priority;
                }
                if let Some(complexity) = patch.complexity {
                    m.complexity = complexity;
                }
                if let Some(recurrence) = patch.recurrence_days {
                    m.recurrence_days = recurrence;
                }
                if let Some(private) = patch.private {
                    m.private = private;
                }
                if let Some(tags) = &patch.tags {
                    m.tags = tags.clone();
                }
                if patch.ext.is_some() {
                    entity.ext = patch.ext.clone();
                }
                Ok(())
            }
            NodePayload::CreateItem(create) => {
                entity.items.push(Item {
                    id: node.id().clone(),
                    deadline: create.deadline,
                    notes: create.notes.clone(),
                    completed_at: None,
                    origin: node.order.clone(),
                    ext: create.ext.clone(),
                });
                Ok(())
            }
            NodePayload::CompleteItem(complete) => {
                self.check_item_reference(entity, &complete.item_id, node)?;
                let recurrence = entity.metadata.recurrence_days;
                let completed_at = node.wall();
                let Some(item) = entity.item_mut(&complete.item_id) else {
                    return Err(RejectReason::InvalidItemReference);
                };
                if item.completed_at.is_some() {
                    return Ok(());
                }
                item.completed_at = Some(completed_at);
                if complete.notes.is_some() {
                    item.notes = complete.notes.clone();
                }
                let deadline = item.deadline;
                if let Some(days) = recurrence {
                    entity.items.push(Item {
                        id: node.id().clone(),
                        deadline: next_deadline(deadline, completed_at, days),
                        notes: None,
                        completed_at: None,
                        origin: node.order.clone(),
                        ext: None,
                    });
                }
                Ok(())
            }
            NodePayload::Snooze(snooze) => {
                self.check_item_reference(entity, &snooze.item_id, node)?;
                if let Some(item) = entity.item_mut(&snooze.item_id) {
                    if item.is_open() {
                        item.deadline = snooze.until;
                    }
                }
                Ok(())
            }
            NodePayload::Archive(_) => {
                entity.metadata.archived = true;
                Ok(())
            }
            NodePayload::Unarchive(_) => {
                entity.metadata.archived = false;
                Ok(())
            }
            NodePayload::Delete(delete) => self.check_tombstone(entity, &delete.ancestry, node),
            NodePayload::Merge(merge) => {
                let bases_ok = self.dag.get(&merge.base).is_some_and(|b| b.node.task_id == entity.task_id)
                    && node
                        .parents()
                        .iter()
                        .all(|p| p == &merge.base || self.dag.is_ancestor(&merge.base, p));
                if !bases_ok {
                    return Err(RejectReason::InvalidMergeBase);
                }
                if merge.resolutions.contains_key(&MergeField::Private)
                    && node.node.author.identity_id != entity.created_by
                {
                    return Err(RejectReason::ForbiddenField);
                }

                let base = self
                    .state_at(&merge.base)
                    .ok_or(RejectReason::InvalidMergeBase)?;
                let mut sides = Vec::with_capacity(node.parents().len());
                for parent in node.parents() {
                    let Some(parent_node) = self.dag.get(parent) else {
                        return Err(RejectReason::DanglingParent);
                    };
                    let key = parent_node.order.clone();
                    let state = self.state_at(parent).ok_or(RejectReason::DanglingParent)?;
                    sides.push(MergeSide {
                        key,
                        metadata: state.metadata,
                    });
                }
                let resolutions: BTreeMap<MergeField, FieldValue> = merge
                    .resolutions
                    .iter()
                    .filter_map(|(field, raw)| FieldValue::from_json(*field, raw).map(|v| (*field, v)))
                    .collect();

                let outcome = resolve(&MergeInput {
                    base: &base.metadata,
                    parents: &sides,
                    strategy: merge.strategy,
                    resolutions: &resolutions,
                });
                outcome.apply_to(&mut entity.metadata);
                for field in outcome.values.keys() {
                    entity.pending_conflicts.remove(field);
                }
                entity.pending_conflicts.extend(outcome.unresolved.iter().copied());
                Ok(())
            }
        }
    }

    /// The item must exist, must not be the genesis, and must have been
    /// produced by an ancestor of the referencing node.
    fn check_item_reference(
        &self,
        entity: &Entity,
        item_id: &NodeId,
        node: &ValidatedNode,
    ) -> Result<(), RejectReason> {
        if item_id == &entity.genesis
            || entity.item(item_id).is_none()
            || !self.dag.is_ancestor(item_id, node.id())
        {
            return Err(RejectReason::InvalidItemReference);
        }
        Ok(())
    }

    /// The ancestry must be the parent's full ancestor closure in total
    /// order: genesis first, the parent last, every merged branch included.
    fn check_tombstone(
        &self,
        entity: &Entity,
        ancestry: &[NodeId],
        node: &ValidatedNode,
    ) -> Result<(), RejectReason> {
        let Some(parent) = node.parents().first() else {
            return Err(RejectReason::MissingTombstoneAncestry);
        };
        let closure = self.dag.ancestor_closure([parent]);
        let expected: Vec<&NodeId> = self
            .dag
            .ordered(&closure)
            .into_iter()
            .filter(|n| n.node.task_id == entity.task_id)
            .map(|n| n.id())
            .collect();
        let complete = expected.len() == ancestry.len()
            && expected.iter().zip(ancestry).all(|(want, got)| *want == got);
        if complete && ancestry.first() == Some(&entity.genesis) && ancestry.last() == Some(parent) {
            Ok(())
        } else {
            Err(RejectReason::MissingTombstoneAncestry)
        }
    }

    /// Entity state as seen by `id`: replay of its ancestor closure.
    fn state_at(&mut self, id: &NodeId) -> Option<Entity> {
        if let Some(cached) = self.branch_states.get(id) {
            return cached.clone();
        }
        let dag = self.dag;
        let closure = dag.ancestor_closure([id]);
        let mut state = None;
        for node in dag.ordered(&closure) {
            if matches!(node.payload, NodePayload::Delete(_)) {
                continue;
            }
            if let Err(reason) = self.apply(&mut state, node) {
                tracing::debug!(
                    node = %node.id().short(),
                    reason = reason.as_str(),
                    "branch replay skipped node"
                );
            }
        }
        self.branch_states.insert(id.clone(), state.clone());
        state
    }
}

/// First deadline strictly after `completed_at`, stepping by `days`.
fn next_deadline(deadline: WallClock, completed_at: WallClock, days: u32) -> WallClock {
    let interval = i64::from(days) * MILLIS_PER_DAY;
    let behind = (completed_at.as_millis() - deadline.as_millis()).max(0);
    let steps = behind / interval + 1;
    deadline.plus_millis(steps.saturating_mul(interval))
}
