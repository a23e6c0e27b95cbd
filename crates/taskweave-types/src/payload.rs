//! Typed per-action payload records.
//!
//! Each action has its own record; unknown keys are refused
//! (`deny_unknown_fields`) and the single forward-compatible escape hatch is
//! the namespaced [`EXTENSION_FIELD`]. Reserved entity-internal names
//! ([`RESERVED_FIELDS`]) are checked by the validator *before* decoding so
//! their presence is reported as a forbidden field, not a schema error.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::clock::WallClock;
use crate::ids::NodeId;
use crate::node::Action;

/// Field names that belong to reconstructed state and may never be supplied.
pub const RESERVED_FIELDS: &[&str] = &["id", "taskId", "items", "archived", "deleted", "createdAt"];

/// The one namespaced field for application-specific data.
pub const EXTENSION_FIELD: &str = "ext";

/// Payload fields that carry wall-clock text.
pub const WALL_CLOCK_FIELDS: &[&str] = &["deadline", "until"];

/// Returns the first reserved field present in a raw payload.
pub fn reserved_field_in(payload: &Map<String, Value>) -> Option<&'static str> {
    RESERVED_FIELDS
        .iter()
        .copied()
        .find(|name| payload.contains_key(*name))
}

fn some_value<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ── Records ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreatePayload {
    pub title: String,
    pub priority: u32,
    #[serde(default = "default_complexity")]
    pub complexity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_days: Option<u32>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

fn default_complexity() -> u32 {
    1
}

/// Metadata patch. Absent means "unchanged"; `recurrenceDays: null` clears.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    #[serde(default, deserialize_with = "some_value", skip_serializing_if = "Option::is_none")]
    pub recurrence_days: Option<Option<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

impl UpdatePayload {
    /// True when the patch touches no metadata field (`ext` alone counts).
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.priority.is_none()
            && self.complexity.is_none()
            && self.recurrence_days.is_none()
            && self.private.is_none()
            && self.tags.is_none()
            && self.ext.is_none()
    }
}

/// Tombstone: every ancestor of the deleted node plus the node itself, in
/// replay order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeletePayload {
    pub ancestry: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateItemPayload {
    pub deadline: WallClock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompleteItemPayload {
    pub item_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SnoozePayload {
    pub item_id: NodeId,
    pub until: WallClock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

/// ARCHIVE / UNARCHIVE carry nothing but an optional extension.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkerPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

/// Default policy for fields changed on more than one side of a merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    Ours,
    Theirs,
    Union,
    #[default]
    LastWriteWins,
    Manual,
    Max,
    Min,
}

/// Entity fields a merge can resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeField {
    Title,
    Priority,
    Complexity,
    RecurrenceDays,
    Private,
    Tags,
    Archived,
}

impl MergeField {
    pub const ALL: [MergeField; 7] = [
        MergeField::Title,
        MergeField::Priority,
        MergeField::Complexity,
        MergeField::RecurrenceDays,
        MergeField::Private,
        MergeField::Tags,
        MergeField::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeField::Title => "title",
            MergeField::Priority => "priority",
            MergeField::Complexity => "complexity",
            MergeField::RecurrenceDays => "recurrenceDays",
            MergeField::Private => "private",
            MergeField::Tags => "tags",
            MergeField::Archived => "archived",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MergePayload {
    pub base: NodeId,
    #[serde(default)]
    pub strategy: MergeStrategy,
    #[serde(default)]
    pub resolutions: BTreeMap<MergeField, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

// ── Sum type ────────────────────────────────────────────────────────────────

/// A decoded payload, one variant per [`Action`].
#[derive(Clone, Debug, PartialEq)]
pub enum NodePayload {
    Create(CreatePayload),
    Update(UpdatePayload),
    Delete(DeletePayload),
    CreateItem(CreateItemPayload),
    CompleteItem(CompleteItemPayload),
    Snooze(SnoozePayload),
    Archive(MarkerPayload),
    Unarchive(MarkerPayload),
    Merge(MergePayload),
}

impl NodePayload {
    /// Decode a raw payload for the given action. Reserved fields are not
    /// checked here; see [`reserved_field_in`].
    pub fn decode(action: Action, raw: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let value = Value::Object(raw.clone());
        Ok(match action {
            Action::Create => NodePayload::Create(serde_json::from_value(value)?),
            Action::Update => NodePayload::Update(serde_json::from_value(value)?),
            Action::Delete => NodePayload::Delete(serde_json::from_value(value)?),
            Action::CreateItem => NodePayload::CreateItem(serde_json::from_value(value)?),
            Action::CompleteItem => NodePayload::CompleteItem(serde_json::from_value(value)?),
            Action::Snooze => NodePayload::Snooze(serde_json::from_value(value)?),
            Action::Archive => NodePayload::Archive(serde_json::from_value(value)?),
            Action::Unarchive => NodePayload::Unarchive(serde_json::from_value(value)?),
            Action::Merge => NodePayload::Merge(serde_json::from_value(value)?),
        })
    }

    pub fn action(&self) -> Action {
        match self {
            NodePayload::Create(_) => Action::Create,
            NodePayload::Update(_) => Action::Update,
            NodePayload::Delete(_) => Action::Delete,
            NodePayload::CreateItem(_) => Action::CreateItem,
            NodePayload::CompleteItem(_) => Action::CompleteItem,
            NodePayload::Snooze(_) => Action::Snooze,
            NodePayload::Archive(_) => Action::Archive,
            NodePayload::Unarchive(_) => Action::Unarchive,
            NodePayload::Merge(_) => Action::Merge,
        }
    }

    /// Encode back to a raw payload object.
    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            NodePayload::Create(p) => serde_json::to_value(p)?,
            NodePayload::Update(p) => serde_json::to_value(p)?,
            NodePayload::Delete(p) => serde_json::to_value(p)?,
            NodePayload::CreateItem(p) => serde_json::to_value(p)?,
            NodePayload::CompleteItem(p) => serde_json::to_value(p)?,
            NodePayload::Snooze(p) => serde_json::to_value(p)?,
            NodePayload::Archive(p) | NodePayload::Unarchive(p) => serde_json::to_value(p)?,
            NodePayload::Merge(p) => serde_json::to_value(p)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
