//! Signed node builders for unit tests.

use serde_json::{Value, json};
use taskweave_cas::{Ed25519Signer, Signer, seal};
use taskweave_dag::next_clock;
use taskweave_types::{Action, Author, DeviceId, Node, NodeDraft, TaskId, Timestamp, WallClock};

/// 2026-01-01T00:00:00.000Z
pub const T0: i64 = 1_767_225_600_000;

pub struct Writer {
    pub signer: Ed25519Signer,
    pub task: TaskId,
}

pub fn writer(task: &str) -> Writer {
    Writer {
        signer: Ed25519Signer::from_secret_bytes(&[7; 32]),
        task: TaskId::from(task),
    }
}

impl Writer {
    pub fn build(&self, action: Action, parents: &[&Node], payload: Value) -> Node {
        let clock = next_clock(parents.iter().map(|p| p.timestamp.logical_clock));
        let draft = NodeDraft {
            parents: parents.iter().map(|p| p.id.clone()).collect(),
            timestamp: Timestamp::new(clock, WallClock::from_millis(T0 + clock as i64 * 1000)),
            author: Author::new(self.signer.public_key(), DeviceId::from("test"), None),
            action,
            task_id: self.task.clone(),
            payload: match payload {
                Value::Object(map) => map,
                _ => Default::default(),
            },
        };
        seal(draft, Some(&self.signer)).unwrap()
    }

    pub fn create(&self, title: &str, priority: u32) -> Node {
        self.build(Action::Create, &[], json!({"title": title, "priority": priority}))
    }

    pub fn update(&self, parent: &Node, patch: Value) -> Node {
        self.build(Action::Update, &[parent], patch)
    }
}
