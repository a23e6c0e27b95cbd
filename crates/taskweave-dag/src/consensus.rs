//! "Tallest chain wins": picking the current item among concurrent ones.
//!
//! Independent clients create items concurrently, so an entity can hold
//! several open items at once. The current one is the open item whose
//! producing node has the greatest order key. The rest stay in history, and
//! completions always apply to the item they name.

use serde::Serialize;
use taskweave_types::{Entity, Item};

/// The open item with the greatest `(logical clock, wall clock, id)`.
pub fn current_item(entity: &Entity) -> Option<&Item> {
    entity.open_items().max_by(|a, b| a.origin.cmp(&b.origin))
}

/// Open items in ascending order; the last one is current.
pub fn open_items(entity: &Entity) -> Vec<&Item> {
    let mut items: Vec<&Item> = entity.open_items().collect();
    items.sort_by(|a, b| a.origin.cmp(&b.origin));
    items
}

/// An item in the audit view.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry<'a> {
    pub item: &'a Item,
    pub current: bool,
}

/// Every item, open or completed, in order, with the current one marked.
pub fn history(entity: &Entity) -> Vec<HistoryEntry<'_>> {
    let current = current_item(entity).map(|item| &item.id);
    let mut items: Vec<&Item> = entity.items.iter().collect();
    items.sort_by(|a, b| a.origin.cmp(&b.origin));
    items
        .into_iter()
        .map(|item| HistoryEntry {
            item,
            current: Some(&item.id) == current,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
