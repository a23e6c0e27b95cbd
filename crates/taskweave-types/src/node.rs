//! The node: the immutable, content-addressed unit of change.
//!
//! A [`Node`] is exactly what travels on the wire. Fields that the validator
//! must be able to reject (`version`, ids, the raw wall-clock string, the
//! payload object) are kept in their raw decoded form so that a malformed node
//! still deserializes and gets a typed rejection rather than a JSON error.
//!
//! Absent optional fields are omitted on the wire, never written as `null`;
//! the canonical body is computed from the re-serialized node, so a sender
//! that writes `null` for an absent field produces a content-hash mismatch.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString, IntoStaticStr};

use crate::clock::WallClock;
use crate::ids::{DeviceId, IdentityId, NodeId, PublicKey, Signature, TaskId};

/// The only protocol version this engine accepts.
pub const PROTOCOL_VERSION: u32 = 1;

/// Logical and wall-clock time of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamp {
    /// Lamport clock: 1 for genesis, else `max(parent) + 1`.
    pub logical_clock: u64,
    /// Raw wire text; see [`WallClock::parse`].
    pub wall_clock: String,
}

impl Timestamp {
    pub fn new(logical_clock: u64, wall_clock: WallClock) -> Self {
        Self {
            logical_clock,
            wall_clock: wall_clock.to_string(),
        }
    }

    /// Parsed wall clock, `None` when the text is not in wire form.
    pub fn wall(&self) -> Option<WallClock> {
        WallClock::parse(&self.wall_clock)
    }
}

/// Who authored a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Must equal `public_key.identity()`.
    pub identity_id: IdentityId,
    pub device_id: DeviceId,
    pub public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Author {
    /// Build an author whose identity is derived from the key.
    pub fn new(public_key: PublicKey, device_id: DeviceId, display_name: Option<String>) -> Self {
        Self {
            identity_id: public_key.identity(),
            device_id,
            public_key,
            display_name,
        }
    }
}

/// The closed set of node actions.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Genesis of an entity.
    Create,
    /// Metadata patch.
    Update,
    /// Tombstone carrying the deleted branch's ancestry.
    Delete,
    CreateItem,
    CompleteItem,
    /// Move an item's deadline.
    Snooze,
    Archive,
    Unarchive,
    /// Explicit multi-parent merge.
    Merge,
}

/// How many parents an action may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentArity {
    None,
    One,
    AtLeastTwo,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn parent_arity(&self) -> ParentArity {
        match self {
            Action::Create => ParentArity::None,
            Action::Merge => ParentArity::AtLeastTwo,
            Action::Update
            | Action::Delete
            | Action::CreateItem
            | Action::CompleteItem
            | Action::Snooze
            | Action::Archive
            | Action::Unarchive => ParentArity::One,
        }
    }

    pub fn is_genesis(&self) -> bool {
        matches!(self, Action::Create)
    }
}

/// A node as it appears on the wire and in storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub version: u32,
    pub parents: Vec<NodeId>,
    pub timestamp: Timestamp,
    pub author: Author,
    pub action: Action,
    pub task_id: TaskId,
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Node {
    /// The JSON body that gets canonicalized and hashed: the node without
    /// `id` and `signature`.
    pub fn body_value(&self) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("id");
            map.remove("signature");
        }
        Ok(value)
    }

    pub fn is_genesis(&self) -> bool {
        self.action.is_genesis()
    }
}

/// An unsealed node: everything but `id` and `signature`.
///
/// Sealing (hashing and signing) lives in `taskweave-cas`; the clock must be
/// computed by the caller from the parents it declares.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeDraft {
    pub parents: Vec<NodeId>,
    pub timestamp: Timestamp,
    pub author: Author,
    pub action: Action,
    pub task_id: TaskId,
    pub payload: Map<String, Value>,
}

impl NodeDraft {
    /// Attach an id (and optional signature) without checking either.
    pub fn into_node(self, id: NodeId, signature: Option<Signature>) -> Node {
        Node {
            id,
            version: PROTOCOL_VERSION,
            parents: self.parents,
            timestamp: self.timestamp,
            author: self.author,
            action: self.action,
            task_id: self.task_id,
            payload: self.payload,
            signature,
        }
    }
}

/// The single total-order key: `(logical clock, wall clock, id)`, ascending.
///
/// Every place that sorts nodes or picks a "latest" one goes through this
/// type. Author identity is deliberately absent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderKey {
    pub logical_clock: u64,
    pub wall_clock: WallClock,
    pub id: NodeId,
}

impl OrderKey {
    pub fn new(logical_clock: u64, wall_clock: WallClock, id: NodeId) -> Self {
        Self {
            logical_clock,
            wall_clock,
            id,
        }
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.logical_clock
            .cmp(&other.logical_clock)
            .then_with(|| self.wall_clock.cmp(&other.wall_clock))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Tests
// ============================================================================
