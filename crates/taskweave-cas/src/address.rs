//! Content addressing: `blake3:<hex>` over the canonical node body.

use taskweave_types::{Node, NodeId};

use crate::canonical::canonicalize;
use crate::error::CasError;

/// Hash arbitrary bytes into a node id.
#[inline]
pub fn address(bytes: &[u8]) -> NodeId {
    NodeId::from_digest(blake3::hash(bytes).as_bytes())
}

/// Canonical bytes of a node body (`id` and `signature` stripped).
///
/// These exact bytes are what gets hashed and what gets signed.
pub fn canonical_body(node: &Node) -> Result<Vec<u8>, CasError> {
    let body = node.body_value()?;
    canonicalize(&body)
}

/// Recompute a node's id from its content.
pub fn address_node(node: &Node) -> Result<NodeId, CasError> {
    Ok(address(&canonical_body(node)?))
}

/// The integrity check used wherever a node is admitted.
pub fn verify_address(node: &Node) -> bool {
    match address_node(node) {
        Ok(id) => id == node.id,
        Err(_) => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_types::{Action, Author, DeviceId, NodeDraft, PublicKey, TaskId, Timestamp, WallClock};

    fn draft() -> NodeDraft {
        NodeDraft {
            parents: vec![],
            timestamp: Timestamp::new(1, WallClock::from_millis(1_000)),
            author: Author::new(PublicKey::from_bytes(&[5; 32]), DeviceId::from("d1"), None),
            action: Action::Create,
            task_id: TaskId::from("task"),
            payload: serde_json::json!({"title": "Buy milk", "priority": 3})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn addressed() -> Node {
        let node = draft().into_node(NodeId::new("pending"), None);
        let id = address_node(&node).unwrap();
        Node { id, ..node }
    }

    #[test]
    fn test_id_is_stable_and_well_formed() {
        let a = addressed();
        let b = addressed();
        assert_eq!(a.id, b.id);
        assert!(a.id.is_well_formed());
        assert!(verify_address(&a));
    }

    #[test]
    fn test_id_ignores_signature() {
        let mut node = addressed();
        node.signature = Some(taskweave_types::Signature::from_bytes(&[1; 64]));
        assert!(verify_address(&node));
    }

    #[test]
    fn test_any_field_change_changes_id() {
        let base = addressed();

        let mut retitled = base.clone();
        retitled.payload.insert("title".into(), serde_json::json!("Buy oat milk"));
        assert!(!verify_address(&retitled));

        let mut reclocked = base.clone();
        reclocked.timestamp.logical_clock = 2;
        assert!(!verify_address(&reclocked));

        let mut moved = base.clone();
        moved.task_id = TaskId::from("other");
        assert!(!verify_address(&moved));

        assert_ne!(address_node(&retitled).unwrap(), base.id);
    }
}
