//! Reconstructed entity snapshots.
//!
//! Nothing here is ever stored: an [`Entity`] is a pure function of the
//! currently known, valid node set and is rebuilt by replay whenever that set
//! changes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::WallClock;
use crate::ids::{IdentityId, NodeId, TaskId};
use crate::node::OrderKey;
use crate::payload::MergeField;

/// An actionable sub-instance of an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Id of the node that produced the item. Never regenerated.
    pub id: NodeId,
    pub deadline: WallClock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<WallClock>,
    /// Order key of the producing node; "tallest chain wins" compares these.
    pub origin: OrderKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

impl Item {
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}

/// A single field value, as diffed and resolved by merges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(u32),
    OptionalNumber(Option<u32>),
    Flag(bool),
    Set(BTreeSet<String>),
}

/// The mergeable metadata of an entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub title: String,
    pub priority: u32,
    pub complexity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_days: Option<u32>,
    pub private: bool,
    pub tags: BTreeSet<String>,
    pub archived: bool,
}

impl Metadata {
    pub fn get(&self, field: MergeField) -> FieldValue {
        match field {
            MergeField::Title => FieldValue::Text(self.title.clone()),
            MergeField::Priority => FieldValue::Number(self.priority),
            MergeField::Complexity => FieldValue::Number(self.complexity),
            MergeField::RecurrenceDays => FieldValue::OptionalNumber(self.recurrence_days),
            MergeField::Private => FieldValue::Flag(self.private),
            MergeField::Tags => FieldValue::Set(self.tags.clone()),
            MergeField::Archived => FieldValue::Flag(self.archived),
        }
    }

    /// Write a value. Returns `false` (and leaves the field alone) when the
    /// value's shape does not fit the field.
    pub fn set(&mut self, field: MergeField, value: FieldValue) -> bool {
        match (field, value) {
            (MergeField::Title, FieldValue::Text(v)) => self.title = v,
            (MergeField::Priority, FieldValue::Number(v)) => self.priority = v,
            (MergeField::Complexity, FieldValue::Number(v)) => self.complexity = v,
            (MergeField::RecurrenceDays, FieldValue::OptionalNumber(v)) => self.recurrence_days = v,
            (MergeField::RecurrenceDays, FieldValue::Number(v)) => self.recurrence_days = Some(v),
            (MergeField::Private, FieldValue::Flag(v)) => self.private = v,
            (MergeField::Archived, FieldValue::Flag(v)) => self.archived = v,
            (MergeField::Tags, FieldValue::Set(v)) => self.tags = v,
            _ => return false,
        }
        true
    }
}

impl FieldValue {
    /// Interpret an explicit merge resolution for `field`. `None` when the JSON
    /// shape is wrong for the field.
    pub fn from_json(field: MergeField, value: &Value) -> Option<Self> {
        match field {
            MergeField::Title => value.as_str().map(|s| FieldValue::Text(s.to_string())),
            MergeField::Priority | MergeField::Complexity => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(FieldValue::Number),
            MergeField::RecurrenceDays => match value {
                Value::Null => Some(FieldValue::OptionalNumber(None)),
                other => other
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .map(|n| FieldValue::OptionalNumber(Some(n))),
            },
            MergeField::Private | MergeField::Archived => value.as_bool().map(FieldValue::Flag),
            MergeField::Tags => {
                let items = value.as_array()?;
                let mut set = BTreeSet::new();
                for item in items {
                    set.insert(item.as_str()?.to_string());
                }
                Some(FieldValue::Set(set))
            }
        }
    }
}

/// Derived lifecycle stage. `Deleted` entities are absent from replay output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    /// Created, no open item.
    Draft,
    /// At least one open item.
    Active,
    Archived,
}

/// An aggregate keyed by task id, rebuilt by replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub task_id: TaskId,
    /// The genesis node.
    pub genesis: NodeId,
    pub created_by: IdentityId,
    pub created_at: WallClock,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    /// Items in production order.
    pub items: Vec<Item>,
    /// Merge fields left unresolved under the `manual` strategy.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pending_conflicts: BTreeSet<MergeField>,
    /// Live nodes with no live children, sorted.
    pub heads: Vec<NodeId>,
}

impl Entity {
    pub fn item(&self, id: &NodeId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn item_mut(&mut self, id: &NodeId) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| &item.id == id)
    }

    pub fn open_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| item.is_open())
    }

    pub fn status(&self) -> EntityStatus {
        if self.metadata.archived {
            EntityStatus::Archived
        } else if self.open_items().next().is_some() {
            EntityStatus::Active
        } else {
            EntityStatus::Draft
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> Metadata {
        Metadata {
            title: "t".into(),
            priority: 2,
            complexity: 1,
            recurrence_days: None,
            private: false,
            tags: BTreeSet::new(),
            archived: false,
        }
    }

    #[test]
    fn test_get_set_roundtrip_all_fields() {
        let mut m = metadata();
        for field in MergeField::ALL {
            let v = m.get(field);
            assert!(m.set(field, v), "{field:?}");
        }
        assert_eq!(m, metadata());
    }

    #[test]
    fn test_set_rejects_wrong_shape() {
        let mut m = metadata();
        assert!(!m.set(MergeField::Priority, FieldValue::Text("high".into())));
        assert_eq!(m.priority, 2);
    }

    #[test]
    fn test_from_json_per_field() {
        assert_eq!(
            FieldValue::from_json(MergeField::Title, &json!("x")),
            Some(FieldValue::Text("x".into()))
        );
        assert_eq!(FieldValue::from_json(MergeField::Priority, &json!("x")), None);
        assert_eq!(
            FieldValue::from_json(MergeField::RecurrenceDays, &Value::Null),
            Some(FieldValue::OptionalNumber(None))
        );
        assert_eq!(
            FieldValue::from_json(MergeField::Tags, &json!(["b", "a", "a"])),
            Some(FieldValue::Set(["a".to_string(), "b".to_string()].into()))
        );
        assert_eq!(FieldValue::from_json(MergeField::Tags, &json!([1])), None);
    }
}
