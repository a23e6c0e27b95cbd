//! Lamport clocks and the total order over nodes.
//!
//! The clock is an explicit value: callers pass the parents' clocks in and get
//! the next clock back. There is no process-wide counter.
//!
//! [`OrderKey`] is the only comparator. Replay order, last-write-wins merges
//! and current-item selection all sort by it.

use std::cmp::Ordering;

use taskweave_types::{Node, OrderKey};

use crate::validate::ValidatedNode;

/// Clock for a node with the given parent clocks: 1 with no parents, else
/// `max + 1`.
pub fn next_clock(parent_clocks: impl IntoIterator<Item = u64>) -> u64 {
    parent_clocks
        .into_iter()
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

/// Order key of a wire node, `None` when its wall clock is not in wire form.
pub fn order_key(node: &Node) -> Option<OrderKey> {
    let wall = node.timestamp.wall()?;
    Some(OrderKey::new(node.timestamp.logical_clock, wall, node.id.clone()))
}

/// Compare two validated nodes by `(logical clock, wall clock, id)`.
pub fn compare(a: &ValidatedNode, b: &ValidatedNode) -> Ordering {
    a.order.cmp(&b.order)
}

/// Sort validated nodes into replay order.
pub fn sort_nodes(nodes: &mut [ValidatedNode]) {
    nodes.sort_by(compare);
}

/// Sort wire nodes into replay order. Nodes with unreadable wall clocks go
/// last, ordered by id.
pub fn sort_wire_nodes(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| match (order_key(a), order_key(b)) {
        (Some(ka), Some(kb)) => ka.cmp(&kb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}

// ============================================================================
// Tests
// ============================================================================
