//! Node builders shared by the integration tests.

#![allow(dead_code)]

use serde_json::{Map, Value, json};
use taskweave_cas::{Ed25519Signer, Signer, seal};
use taskweave_types::{
    Action, Author, DeviceId, Node, NodeDraft, NodeId, TaskId, Timestamp, WallClock,
};

use taskweave_dag::next_clock;

/// 2026-01-01T00:00:00.000Z
pub const T0: i64 = 1_767_225_600_000;

pub fn obj(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// One author writing into one task.
pub struct Writer {
    pub signer: Ed25519Signer,
    pub device: DeviceId,
    pub task: TaskId,
}

impl Writer {
    pub fn new(task: &str) -> Self {
        Self::with_seed(7, task)
    }

    pub fn with_seed(seed: u8, task: &str) -> Self {
        Self {
            signer: Ed25519Signer::from_secret_bytes(&[seed; 32]),
            device: DeviceId::from(format!("device-{seed}")),
            task: TaskId::from(task),
        }
    }

    /// Build a signed node. Clock follows the parents; wall clock is
    /// `T0 + clock seconds` unless `wall` is given.
    pub fn build(&self, action: Action, parents: &[&Node], payload: Value, wall: Option<i64>) -> Node {
        let clock = next_clock(parents.iter().map(|p| p.timestamp.logical_clock));
        self.build_raw(
            action,
            parents.iter().map(|p| p.id.clone()).collect(),
            clock,
            wall.unwrap_or(T0 + clock as i64 * 1000),
            payload,
        )
    }

    pub fn build_raw(
        &self,
        action: Action,
        parents: Vec<NodeId>,
        clock: u64,
        wall: i64,
        payload: Value,
    ) -> Node {
        let draft = NodeDraft {
            parents,
            timestamp: Timestamp::new(clock, WallClock::from_millis(wall)),
            author: Author::new(self.signer.public_key(), self.device.clone(), None),
            action,
            task_id: self.task.clone(),
            payload: obj(payload),
        };
        seal(draft, Some(&self.signer)).unwrap()
    }

    pub fn create(&self, title: &str, priority: u32) -> Node {
        self.build(Action::Create, &[], json!({"title": title, "priority": priority}), None)
    }

    pub fn update(&self, parent: &Node, patch: Value) -> Node {
        self.build(Action::Update, &[parent], patch, None)
    }

    pub fn item(&self, parent: &Node, deadline: WallClock) -> Node {
        self.build(
            Action::CreateItem,
            &[parent],
            json!({"deadline": deadline.to_string()}),
            None,
        )
    }

    pub fn complete(&self, parent: &Node, item: &NodeId) -> Node {
        self.build(Action::CompleteItem, &[parent], json!({"itemId": item}), None)
    }

    pub fn delete(&self, parent: &Node, ancestry: &[&Node]) -> Node {
        let ids: Vec<&NodeId> = ancestry.iter().map(|n| &n.id).collect();
        self.build(Action::Delete, &[parent], json!({"ancestry": ids}), None)
    }

    pub fn merge(&self, parents: &[&Node], base: &Node, extra: Value) -> Node {
        let mut payload = obj(extra);
        payload.insert("base".into(), json!(base.id));
        self.build(Action::Merge, parents, Value::Object(payload), None)
    }
}
