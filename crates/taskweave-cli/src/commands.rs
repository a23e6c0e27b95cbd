//! Subcommand bodies. Each takes parsed nodes and returns a serializable
//! view; printing is left to `main`.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};
use serde::Serialize;

use taskweave_dag::{
    NodeValidator, Origin, Reconstruction, Reconstructor, RejectReason, ReplayReport,
    current_item, history as item_history, rank_entities,
};
use taskweave_types::{EntityStatus, Node, NodeId, TaskId, WallClock};

fn replay_all(nodes: &[Node], validator: &NodeValidator) -> Reconstruction {
    Reconstructor::new(validator.clone()).reconstruct(nodes)
}

// ── validate ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub node: NodeId,
    pub task: TaskId,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

/// Structural verdict for every node, in file order.
pub fn validate(nodes: &[Node], validator: &NodeValidator, origin: Origin) -> Vec<Verdict> {
    nodes
        .iter()
        .map(|node| {
            let reason = validator.validate(node, origin).reason();
            Verdict {
                node: node.id.clone(),
                task: node.task_id.clone(),
                valid: reason.is_none(),
                reason,
            }
        })
        .collect()
}

// ── replay ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedView {
    pub task_id: TaskId,
    pub title: String,
    pub status: EntityStatus,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<WallClock>,
}

/// Live entities, highest score first.
pub fn replay(nodes: &[Node], validator: &NodeValidator, now: WallClock) -> Vec<RankedView> {
    let reconstruction = replay_all(nodes, validator);
    rank_entities(reconstruction.entities.values(), now)
        .into_iter()
        .map(|ranked| {
            let item = current_item(ranked.entity);
            RankedView {
                task_id: ranked.entity.task_id.clone(),
                title: ranked.entity.metadata.title.clone(),
                status: ranked.entity.status(),
                score: ranked.score,
                current_item: item.map(|i| i.id.clone()),
                deadline: item.map(|i| i.deadline),
            }
        })
        .collect()
}

// ── history ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: NodeId,
    pub deadline: WallClock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<WallClock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub current: bool,
}

/// Every item of one entity, oldest first.
pub fn history(nodes: &[Node], validator: &NodeValidator, task: &TaskId) -> Result<Vec<ItemView>> {
    let reconstruction = replay_all(nodes, validator);
    let Some(entity) = reconstruction.entities.get(task) else {
        bail!("no live entity {task}");
    };
    Ok(item_history(entity)
        .into_iter()
        .map(|entry| ItemView {
            id: entry.item.id.clone(),
            deadline: entry.item.deadline,
            completed_at: entry.item.completed_at,
            notes: entry.item.notes.clone(),
            current: entry.current,
        })
        .collect())
}

// ── prune ───────────────────────────────────────────────────────────────────

/// Ids storage may drop.
pub fn prune(nodes: &[Node], validator: &NodeValidator) -> BTreeSet<NodeId> {
    replay_all(nodes, validator).report.prunable
}

// ── inspect ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub nodes: usize,
    pub entities: usize,
    pub counts: BTreeMap<RejectReason, usize>,
    #[serde(flatten)]
    pub report: ReplayReport,
}

pub fn inspect(nodes: &[Node], validator: &NodeValidator) -> Inspection {
    let reconstruction = replay_all(nodes, validator);
    Inspection {
        nodes: nodes.len(),
        entities: reconstruction.entities.len(),
        counts: reconstruction.report.counts(),
        report: reconstruction.report,
    }
}

// ============================================================================
// Tests
// ============================================================================
