//! Three-way field merge for multi-parent nodes.
//!
//! For every mergeable field the winner is picked by, in order:
//!
//! 1. an explicit resolution in the merge payload,
//! 2. the only parent that changed the field relative to the base,
//! 3. the merge strategy applied across the parents that changed it.
//!
//! Fields nobody changed and nobody resolved are not written. Explicit
//! resolutions only cover the fields they name; the strategy still decides
//! the rest.

use std::collections::{BTreeMap, BTreeSet};

use taskweave_types::{FieldValue, MergeField, MergeStrategy, Metadata, OrderKey};

/// One side of a merge: a parent's reconstructed metadata and order key.
#[derive(Clone, Debug)]
pub struct MergeSide {
    pub key: OrderKey,
    pub metadata: Metadata,
}

/// Everything the resolver needs. Parents are in declared order.
#[derive(Clone, Debug)]
pub struct MergeInput<'a> {
    pub base: &'a Metadata,
    pub parents: &'a [MergeSide],
    pub strategy: MergeStrategy,
    pub resolutions: &'a BTreeMap<MergeField, FieldValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutcome {
    /// Values to write, one per changed or resolved field.
    pub values: BTreeMap<MergeField, FieldValue>,
    /// Fields left at the base value under `manual`.
    pub unresolved: BTreeSet<MergeField>,
}

impl MergeOutcome {
    /// Write the resolved values into `metadata`.
    pub fn apply_to(&self, metadata: &mut Metadata) {
        for (field, value) in &self.values {
            metadata.set(*field, value.clone());
        }
    }
}

/// Resolve every mergeable field.
pub fn resolve(input: &MergeInput<'_>) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for field in MergeField::ALL {
        if let Some(explicit) = input.resolutions.get(&field) {
            outcome.values.insert(field, explicit.clone());
            continue;
        }

        let base_value = input.base.get(field);
        let changed: Vec<(&OrderKey, FieldValue)> = input
            .parents
            .iter()
            .map(|side| (&side.key, side.metadata.get(field)))
            .filter(|(_, value)| *value != base_value)
            .collect();

        match changed.as_slice() {
            [] => {}
            [(_, only)] => {
                outcome.values.insert(field, only.clone());
            }
            _ if agree(&changed) => {
                outcome.values.insert(field, changed[0].1.clone());
            }
            _ => match apply_strategy(input.strategy, field, &changed) {
                Some(value) => {
                    outcome.values.insert(field, value);
                }
                None => {
                    outcome.values.insert(field, base_value);
                    outcome.unresolved.insert(field);
                }
            },
        }
    }

    outcome
}

fn agree(changed: &[(&OrderKey, FieldValue)]) -> bool {
    changed.windows(2).all(|w| w[0].1 == w[1].1)
}

/// `None` leaves the field unresolved (always for `manual`).
fn apply_strategy(
    strategy: MergeStrategy,
    field: MergeField,
    changed: &[(&OrderKey, FieldValue)],
) -> Option<FieldValue> {
    match strategy {
        MergeStrategy::Manual => None,
        MergeStrategy::LastWriteWins => last_write(changed),
        MergeStrategy::Ours => changed.first().map(|(_, v)| v.clone()),
        MergeStrategy::Theirs => changed.last().map(|(_, v)| v.clone()),
        MergeStrategy::Union => match field {
            MergeField::Tags => {
                let mut all = BTreeSet::new();
                for (_, value) in changed {
                    if let FieldValue::Set(tags) = value {
                        all.extend(tags.iter().cloned());
                    }
                }
                Some(FieldValue::Set(all))
            }
            _ => last_write(changed),
        },
        MergeStrategy::Max => extreme(field, changed, true),
        MergeStrategy::Min => extreme(field, changed, false),
    }
}

fn last_write(changed: &[(&OrderKey, FieldValue)]) -> Option<FieldValue> {
    changed
        .iter()
        .max_by(|a, b| a.0.cmp(b.0))
        .map(|(_, v)| v.clone())
}

/// Numeric max/min, OR/AND for flags, last-write-wins for text and sets.
fn extreme(field: MergeField, changed: &[(&OrderKey, FieldValue)], max: bool) -> Option<FieldValue> {
    let values = changed.iter().map(|(_, v)| v);
    match field {
        MergeField::Priority | MergeField::Complexity => {
            let numbers = values.filter_map(|v| match v {
                FieldValue::Number(n) => Some(*n),
                _ => None,
            });
            let picked = if max { numbers.max() } else { numbers.min() };
            picked.map(FieldValue::Number)
        }
        // A cleared recurrence never wins; only set intervals compete.
        MergeField::RecurrenceDays => {
            let numbers = values.filter_map(|v| match v {
                FieldValue::OptionalNumber(n) => *n,
                _ => None,
            });
            let picked = if max { numbers.max() } else { numbers.min() };
            Some(FieldValue::OptionalNumber(picked))
        }
        MergeField::Private | MergeField::Archived => {
            let mut flags = values.filter_map(|v| match v {
                FieldValue::Flag(b) => Some(*b),
                _ => None,
            });
            let picked = if max { flags.any(|b| b) } else { flags.all(|b| b) };
            Some(FieldValue::Flag(picked))
        }
        MergeField::Title | MergeField::Tags => last_write(changed),
    }
}

// ============================================================================
// Tests
// ============================================================================
