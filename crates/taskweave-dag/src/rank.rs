//! Presentation ranking. Never feeds back into protocol state.
//!
//! `rank = priority_weight × urgency(d) × complexity_weight`, where `d` is
//! the fractional number of days from `now` to the current item's deadline.
//! Urgency is a logistic curve: it rises as the deadline approaches, has its
//! inflection exactly at the deadline and levels off at
//! `URGENCY_BASE + URGENCY_SCALE` once overdue.

use std::cmp::Ordering;

use taskweave_types::{Entity, TaskId, WallClock};

use crate::consensus::current_item;

pub const URGENCY_BASE: f64 = 1.0;
pub const URGENCY_SCALE: f64 = 10.0;
pub const URGENCY_STEEPNESS: f64 = 0.4;

const PRIORITY_WEIGHTS: [f64; 5] = [1.0, 1.5, 2.0, 3.0, 5.0];
const COMPLEXITY_WEIGHTS: [f64; 5] = [1.0, 1.1, 1.2, 1.35, 1.5];

/// Weight for priority 1..=5; out-of-range values clamp.
pub fn priority_weight(priority: u32) -> f64 {
    PRIORITY_WEIGHTS[weight_index(priority)]
}

/// Weight for complexity 1..=5; out-of-range values clamp.
pub fn complexity_weight(complexity: u32) -> f64 {
    COMPLEXITY_WEIGHTS[weight_index(complexity)]
}

fn weight_index(value: u32) -> usize {
    (value.clamp(1, 5) - 1) as usize
}

/// `1 + 10 / (1 + e^(0.4 d))`.
pub fn urgency(days_until_deadline: f64) -> f64 {
    URGENCY_BASE + URGENCY_SCALE / (1.0 + (URGENCY_STEEPNESS * days_until_deadline).exp())
}

/// Score for display ordering. Entities without an open item get base
/// urgency.
pub fn rank(entity: &Entity, now: WallClock) -> f64 {
    let urgency = match current_item(entity) {
        Some(item) => urgency(now.days_until(item.deadline)),
        None => URGENCY_BASE,
    };
    priority_weight(entity.metadata.priority) * urgency * complexity_weight(entity.metadata.complexity)
}

/// A ranked entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Ranked<'a> {
    pub entity: &'a Entity,
    pub score: f64,
}

impl Ranked<'_> {
    pub fn task_id(&self) -> &TaskId {
        &self.entity.task_id
    }
}

/// Highest score first; equal scores by task id.
pub fn rank_entities<'a>(entities: impl IntoIterator<Item = &'a Entity>, now: WallClock) -> Vec<Ranked<'a>> {
    let mut ranked: Vec<Ranked<'a>> = entities
        .into_iter()
        .map(|entity| Ranked {
            entity,
            score: rank(entity, now),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.entity.task_id.cmp(&b.entity.task_id))
    });
    ranked
}

// ============================================================================
// Tests
// ============================================================================
