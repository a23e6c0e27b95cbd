//! Structural validation of single nodes.
//!
//! The validator looks at one node at a time and never at the rest of the
//! graph; cross-node rules (duplicate genesis, item references, tombstone
//! ancestry) are checked during replay. Checks run in a fixed order and stop
//! at the first failure, so a node always gets the same reason.
//!
//! | # | Check                              | Reason                     |
//! |---|------------------------------------|----------------------------|
//! | 1 | protocol version                   | `unsupported_version`      |
//! | 2 | id and parent id encoding          | `encoding_violation`       |
//! | 3 | recomputed content address         | `content_hash_mismatch`    |
//! | 4 | parent arity, clock, wall clock    | `schema_mismatch` / `causal_clock_violation` / `encoding_violation` |
//! | 5 | reserved fields, payload shape     | `forbidden_field` / `schema_mismatch` |
//! | 6 | value ranges and lengths           | `constraint_violation`     |
//! | 7 | canonical payload size             | `payload_too_large`        |
//! | 8 | author key, identity, device, task | `encoding_violation` / `identity_mismatch` / `schema_mismatch` |
//! | 9 | signature                          | `invalid_signature` / `missing_signature` |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::IntoStaticStr;
use thiserror::Error;

use taskweave_cas::{SignatureVerifier, address, canonical_body, canonicalize};
use taskweave_types::{
    CreatePayload, FieldValue, MergeField, MergePayload, Node, NodeId, NodePayload,
    OrderKey, PROTOCOL_VERSION, ParentArity, UpdatePayload, WALL_CLOCK_FIELDS, WallClock,
    reserved_field_in,
};

/// Why a node was refused. Codes are stable and meant for logs and metrics.
#[derive(
    Error, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    #[error("signature does not verify")]
    InvalidSignature,
    #[error("remote node carries no signature")]
    MissingSignature,
    #[error("payload or structure does not match the action schema")]
    SchemaMismatch,
    #[error("id does not match the content address")]
    ContentHashMismatch,
    #[error("field is not in its wire encoding")]
    EncodingViolation,
    #[error("payload carries a reserved or forbidden field")]
    ForbiddenField,
    #[error("entity already has a genesis node")]
    DuplicateGenesis,
    #[error("item reference does not name a known item")]
    InvalidItemReference,
    #[error("tombstone ancestry is incomplete")]
    MissingTombstoneAncestry,
    #[error("logical clock does not follow its parents")]
    CausalClockViolation,
    #[error("parent is unknown or belongs to another entity")]
    DanglingParent,
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("value outside its allowed range")]
    ConstraintViolation,
    #[error("payload exceeds the size limit")]
    PayloadTooLarge,
    #[error("identity id is not derived from the public key")]
    IdentityMismatch,
    #[error("merge base is not a common ancestor of the parents")]
    InvalidMergeBase,
    #[error("an ancestor was rejected")]
    BrokenBranch,
}

impl RejectReason {
    /// Stable snake_case code.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Where a node came from. Remote nodes must be signed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Local,
    Remote,
}

// ── Limits ──────────────────────────────────────────────────────────────────

pub const PRIORITY_RANGE: std::ops::RangeInclusive<u32> = 1..=5;
pub const COMPLEXITY_RANGE: std::ops::RangeInclusive<u32> = 1..=5;
pub const RECURRENCE_DAYS_RANGE: std::ops::RangeInclusive<u32> = 1..=3650;

/// Size and length ceilings. Ranges for priority, complexity and recurrence
/// are protocol constants and not configurable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    /// Canonical payload bytes.
    pub max_payload_bytes: usize,
    pub max_title_chars: usize,
    pub max_notes_chars: usize,
    pub max_tags: usize,
    pub max_tag_chars: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 16 * 1024,
            max_title_chars: 256,
            max_notes_chars: 4096,
            max_tags: 32,
            max_tag_chars: 64,
        }
    }
}

// ── Outcome ─────────────────────────────────────────────────────────────────

/// A node that passed structural validation, with its payload decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedNode {
    pub node: Node,
    pub payload: NodePayload,
    pub order: OrderKey,
}

impl ValidatedNode {
    pub fn id(&self) -> &NodeId {
        &self.node.id
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.node.parents
    }

    pub fn clock(&self) -> u64 {
        self.node.timestamp.logical_clock
    }

    pub fn wall(&self) -> WallClock {
        self.order.wall_clock
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValidationOutcome {
    Valid(ValidatedNode),
    Rejected(RejectReason),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            ValidationOutcome::Valid(_) => None,
            ValidationOutcome::Rejected(reason) => Some(*reason),
        }
    }

    pub fn into_result(self) -> Result<ValidatedNode, RejectReason> {
        match self {
            ValidationOutcome::Valid(node) => Ok(node),
            ValidationOutcome::Rejected(reason) => Err(reason),
        }
    }
}

// ── Validator ───────────────────────────────────────────────────────────────

/// Stateless structural validator.
#[derive(Clone, Debug, Default)]
pub struct NodeValidator {
    limits: ValidationLimits,
}

impl NodeValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Validate one node. Never mutates or repairs it.
    pub fn validate(&self, node: &Node, origin: Origin) -> ValidationOutcome {
        match self.check(node, origin) {
            Ok(valid) => ValidationOutcome::Valid(valid),
            Err(reason) => ValidationOutcome::Rejected(reason),
        }
    }

    fn check(&self, node: &Node, origin: Origin) -> Result<ValidatedNode, RejectReason> {
        if node.version != PROTOCOL_VERSION {
            return Err(RejectReason::UnsupportedVersion);
        }

        if !node.id.is_well_formed() || !node.parents.iter().all(NodeId::is_well_formed) {
            return Err(RejectReason::EncodingViolation);
        }

        let body = canonical_body(node).map_err(|_| RejectReason::EncodingViolation)?;
        if address(&body) != node.id {
            return Err(RejectReason::ContentHashMismatch);
        }

        let wall = check_structure(node)?;
        let payload = check_payload_shape(node)?;
        self.check_constraints(&payload)?;

        let payload_bytes = canonicalize(&Value::Object(node.payload.clone()))
            .map_err(|_| RejectReason::EncodingViolation)?;
        if payload_bytes.len() > self.limits.max_payload_bytes {
            return Err(RejectReason::PayloadTooLarge);
        }

        check_author(node)?;

        match (&node.signature, origin) {
            (Some(signature), _) => {
                if !SignatureVerifier::verify(&body, signature, &node.author.public_key) {
                    return Err(RejectReason::InvalidSignature);
                }
            }
            (None, Origin::Remote) => return Err(RejectReason::MissingSignature),
            (None, Origin::Local) => {}
        }

        Ok(ValidatedNode {
            order: OrderKey::new(node.timestamp.logical_clock, wall, node.id.clone()),
            node: node.clone(),
            payload,
        })
    }

    fn check_constraints(&self, payload: &NodePayload) -> Result<(), RejectReason> {
        let ok = match payload {
            NodePayload::Create(p) => self.create_ok(p),
            NodePayload::Update(p) => self.update_ok(p),
            NodePayload::Delete(p) => {
                let distinct: HashSet<&NodeId> = p.ancestry.iter().collect();
                !p.ancestry.is_empty() && distinct.len() == p.ancestry.len()
            }
            NodePayload::CreateItem(p) => self.notes_ok(p.notes.as_deref()),
            NodePayload::CompleteItem(p) => self.notes_ok(p.notes.as_deref()),
            NodePayload::Snooze(_) | NodePayload::Archive(_) | NodePayload::Unarchive(_) => true,
            NodePayload::Merge(p) => p.resolutions.iter().all(|(field, raw)| {
                FieldValue::from_json(*field, raw).is_some_and(|v| self.field_ok(*field, &v))
            }),
        };
        if ok {
            Ok(())
        } else {
            Err(RejectReason::ConstraintViolation)
        }
    }

    fn create_ok(&self, p: &CreatePayload) -> bool {
        self.title_ok(&p.title)
            && PRIORITY_RANGE.contains(&p.priority)
            && COMPLEXITY_RANGE.contains(&p.complexity)
            && p.recurrence_days.is_none_or(|d| RECURRENCE_DAYS_RANGE.contains(&d))
            && self.tags_ok(&p.tags)
    }

    fn update_ok(&self, p: &UpdatePayload) -> bool {
        p.title.as_deref().is_none_or(|t| self.title_ok(t))
            && p.priority.is_none_or(|v| PRIORITY_RANGE.contains(&v))
            && p.complexity.is_none_or(|v| COMPLEXITY_RANGE.contains(&v))
            && p.recurrence_days
                .flatten()
                .is_none_or(|d| RECURRENCE_DAYS_RANGE.contains(&d))
            && p.tags.as_ref().is_none_or(|t| self.tags_ok(t))
    }

    fn field_ok(&self, field: MergeField, value: &FieldValue) -> bool {
        match (field, value) {
            (MergeField::Title, FieldValue::Text(t)) => self.title_ok(t),
            (MergeField::Priority, FieldValue::Number(n)) => PRIORITY_RANGE.contains(n),
            (MergeField::Complexity, FieldValue::Number(n)) => COMPLEXITY_RANGE.contains(n),
            (MergeField::RecurrenceDays, FieldValue::OptionalNumber(n)) => {
                n.is_none_or(|d| RECURRENCE_DAYS_RANGE.contains(&d))
            }
            (MergeField::Tags, FieldValue::Set(tags)) => self.tags_ok(tags),
            _ => true,
        }
    }

    fn title_ok(&self, title: &str) -> bool {
        let trimmed = title.trim();
        !trimmed.is_empty() && trimmed.chars().count() <= self.limits.max_title_chars
    }

    fn notes_ok(&self, notes: Option<&str>) -> bool {
        notes.is_none_or(|n| n.chars().count() <= self.limits.max_notes_chars)
    }

    fn tags_ok<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        let mut count = 0;
        for tag in tags {
            count += 1;
            let len = tag.chars().count();
            if len == 0 || len > self.limits.max_tag_chars {
                return false;
            }
        }
        count <= self.limits.max_tags
    }
}

/// Parent arity, duplicate parents, clock and wall clock.
fn check_structure(node: &Node) -> Result<WallClock, RejectReason> {
    let arity_ok = match node.action.parent_arity() {
        ParentArity::None => node.parents.is_empty(),
        ParentArity::One => node.parents.len() == 1,
        ParentArity::AtLeastTwo => node.parents.len() >= 2,
    };
    if !arity_ok {
        return Err(RejectReason::SchemaMismatch);
    }
    let distinct: HashSet<&NodeId> = node.parents.iter().collect();
    if distinct.len() != node.parents.len() {
        return Err(RejectReason::SchemaMismatch);
    }

    let clock = node.timestamp.logical_clock;
    let clock_ok = if node.is_genesis() { clock == 1 } else { clock > 1 };
    if !clock_ok {
        return Err(RejectReason::CausalClockViolation);
    }

    node.timestamp.wall().ok_or(RejectReason::EncodingViolation)
}

/// Reserved fields, wall-clock text, then the typed decode.
fn check_payload_shape(node: &Node) -> Result<NodePayload, RejectReason> {
    if reserved_field_in(&node.payload).is_some() {
        return Err(RejectReason::ForbiddenField);
    }
    for field in WALL_CLOCK_FIELDS {
        if let Some(Value::String(raw)) = node.payload.get(*field) {
            if WallClock::parse(raw).is_none() {
                return Err(RejectReason::EncodingViolation);
            }
        }
    }

    let payload =
        NodePayload::decode(node.action, &node.payload).map_err(|_| RejectReason::SchemaMismatch)?;

    let referenced: Vec<&NodeId> = match &payload {
        NodePayload::CompleteItem(p) => vec![&p.item_id],
        NodePayload::Snooze(p) => vec![&p.item_id],
        NodePayload::Merge(p) => vec![&p.base],
        NodePayload::Delete(p) => p.ancestry.iter().collect(),
        _ => Vec::new(),
    };
    if !referenced.into_iter().all(NodeId::is_well_formed) {
        return Err(RejectReason::EncodingViolation);
    }

    match &payload {
        NodePayload::Update(p) if p.is_empty() => Err(RejectReason::SchemaMismatch),
        NodePayload::Merge(p) if resolutions_misshapen(p) => Err(RejectReason::SchemaMismatch),
        _ => Ok(payload),
    }
}

fn resolutions_misshapen(p: &MergePayload) -> bool {
    p.resolutions
        .iter()
        .any(|(field, raw)| FieldValue::from_json(*field, raw).is_none())
}

fn check_author(node: &Node) -> Result<(), RejectReason> {
    let author = &node.author;
    if !author.public_key.is_well_formed() || !author.identity_id.is_well_formed() {
        return Err(RejectReason::EncodingViolation);
    }
    if author.identity_id != author.public_key.identity() {
        return Err(RejectReason::IdentityMismatch);
    }
    if !author.device_id.is_well_formed() || !node.task_id.is_well_formed() {
        return Err(RejectReason::SchemaMismatch);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{T0, Writer};
    use serde_json::json;
    use taskweave_cas::{Signer, address_node};
    use taskweave_types::{Action, IdentityId, PublicKey, Signature};

    fn validator() -> NodeValidator {
        NodeValidator::default()
    }

    fn reason(node: &Node, origin: Origin) -> Option<RejectReason> {
        validator().validate(node, origin).reason()
    }

    /// Re-address after a manual edit so later checks are reached.
    fn readdress(mut node: Node, w: &Writer) -> Node {
        node.id = address_node(&node).unwrap();
        let body = canonical_body(&node).unwrap();
        node.signature = Some(w.signer.sign(&body));
        node
    }

    #[test]
    fn test_valid_create_local_and_remote() {
        let w = Writer::new("t1");
        let node = w.create("Buy milk", 3);
        assert!(validator().validate(&node, Origin::Local).is_valid());
        let valid = validator().validate(&node, Origin::Remote).into_result().unwrap();
        assert!(matches!(valid.payload, NodePayload::Create(_)));
        assert_eq!(valid.order.logical_clock, 1);
        assert_eq!(valid.wall(), WallClock::from_millis(T0 + 1000));
    }

    #[test]
    fn test_reason_codes_are_snake_case() {
        assert_eq!(RejectReason::ContentHashMismatch.as_str(), "content_hash_mismatch");
        assert_eq!(RejectReason::BrokenBranch.as_str(), "broken_branch");
        assert_eq!(
            serde_json::to_string(&RejectReason::MissingTombstoneAncestry).unwrap(),
            "\"missing_tombstone_ancestry\""
        );
    }

    #[test]
    fn test_version_checked_first() {
        let w = Writer::new("t1");
        let mut node = w.create("x", 1);
        node.version = 2;
        node.id = NodeId::new("garbage");
        assert_eq!(reason(&node, Origin::Local), Some(RejectReason::UnsupportedVersion));
    }

    #[test]
    fn test_id_encoding() {
        let w = Writer::new("t1");
        let mut node = w.create("x", 1);
        node.id = NodeId::new(node.id.as_str().to_uppercase().replace("BLAKE3", "blake3"));
        assert_eq!(reason(&node, Origin::Local), Some(RejectReason::EncodingViolation));
    }

    #[test]
    fn test_tampered_payload_is_hash_mismatch() {
        let w = Writer::new("t1");
        let mut node = w.create("Buy milk", 3);
        node.payload.insert("title".into(), json!("Buy beer"));
        assert_eq!(reason(&node, Origin::Local), Some(RejectReason::ContentHashMismatch));
    }

    #[test]
    fn test_parent_arity() {
        let w = Writer::new("t1");
        let genesis = w.create("x", 1);
        let orphan_update = w.build_raw(Action::Update, vec![], 2, T0, json!({"title": "y"}));
        assert_eq!(reason(&orphan_update, Origin::Local), Some(RejectReason::SchemaMismatch));

        let one_parent_merge = w.build(Action::Merge, &[&genesis], json!({"base": genesis.id}), None);
        assert_eq!(reason(&one_parent_merge, Origin::Local), Some(RejectReason::SchemaMismatch));

        let twice = w.build_raw(
            Action::Merge,
            vec![genesis.id.clone(), genesis.id.clone()],
            2,
            T0,
            json!({"base": genesis.id}),
        );
        assert_eq!(reason(&twice, Origin::Local), Some(RejectReason::SchemaMismatch));
    }

    #[test]
    fn test_genesis_clock_must_be_one() {
        let w = Writer::new("t1");
        let node = w.build_raw(Action::Create, vec![], 3, T0, json!({"title": "x", "priority": 1}));
        assert_eq!(reason(&node, Origin::Local), Some(RejectReason::CausalClockViolation));
    }

    #[test]
    fn test_bad_wall_clock() {
        let w = Writer::new("t1");
        let mut node = w.create("x", 1);
        node.timestamp.wall_clock = "2026-01-01T00:00:00Z".into();
        let node = readdress(node, &w);
        assert_eq!(reason(&node, Origin::Local), Some(RejectReason::EncodingViolation));
    }

    #[test]
    fn test_reserved_field_is_forbidden() {
        let w = Writer::new("t1");
        let node = w.build(Action::Create, &[], json!({"title": "x", "priority": 1, "archived": true}), None);
        assert_eq!(reason(&node, Origin::Local), Some(RejectReason::ForbiddenField));
    }

    #[test]
    fn test_schema_mismatches() {
        let w = Writer::new("t1");
        let genesis = w.create("x", 1);

        let unknown = w.build(Action::Create, &[], json!({"title": "x", "priority": 1, "colour": 2}), None);
        assert_eq!(reason(&unknown, Origin::Local), Some(RejectReason::SchemaMismatch));

        let missing = w.build(Action::Create, &[], json!({"title": "x"}), None);
        assert_eq!(reason(&missing, Origin::Local), Some(RejectReason::SchemaMismatch));

        let empty_update = w.update(&genesis, json!({}));
        assert_eq!(reason(&empty_update, Origin::Local), Some(RejectReason::SchemaMismatch));

        let ext_only = w.update(&genesis, json!({"ext": {"app": 1}}));
        assert_eq!(reason(&ext_only, Origin::Local), None);

        let bad_resolution = w.build(
            Action::Merge,
            &[&genesis, &ext_only],
            json!({"base": genesis.id, "resolutions": {"priority": "high"}}),
            None,
        );
        assert_eq!(reason(&bad_resolution, Origin::Local), Some(RejectReason::SchemaMismatch));
    }

    #[test]
    fn test_payload_wall_clock_and_ids_encoding() {
        let w = Writer::new("t1");
        let genesis = w.create("x", 1);
        let bad_deadline = w.build(Action::CreateItem, &[&genesis], json!({"deadline": "tomorrow"}), None);
        assert_eq!(reason(&bad_deadline, Origin::Local), Some(RejectReason::EncodingViolation));

        let bad_item = w.complete(&genesis, &NodeId::new("blake3:XYZ"));
        assert_eq!(reason(&bad_item, Origin::Local), Some(RejectReason::EncodingViolation));
    }

    #[test]
    fn test_constraints() {
        let w = Writer::new("t1");
        for payload in [
            json!({"title": "  ", "priority": 1}),
            json!({"title": "x", "priority": 0}),
            json!({"title": "x", "priority": 6}),
            json!({"title": "x", "priority": 1, "complexity": 9}),
            json!({"title": "x", "priority": 1, "recurrenceDays": 0}),
            json!({"title": "x".repeat(257), "priority": 1}),
            json!({"title": "x", "priority": 1, "tags": [""]}),
        ] {
            let node = w.build(Action::Create, &[], payload.clone(), None);
            assert_eq!(
                reason(&node, Origin::Local),
                Some(RejectReason::ConstraintViolation),
                "{payload}"
            );
        }

        let genesis = w.create("x", 1);
        let empty_ancestry = w.build(Action::Delete, &[&genesis], json!({"ancestry": []}), None);
        assert_eq!(reason(&empty_ancestry, Origin::Local), Some(RejectReason::ConstraintViolation));
    }

    #[test]
    fn test_payload_too_large() {
        let w = Writer::new("t1");
        let genesis = w.create("x", 1);
        let notes = "n".repeat(4000);
        let node = w.build(
            Action::CreateItem,
            &[&genesis],
            json!({"deadline": "2026-02-01T00:00:00.000Z", "notes": notes, "ext": {"blob": "b".repeat(20_000)}}),
            None,
        );
        assert_eq!(reason(&node, Origin::Local), Some(RejectReason::PayloadTooLarge));

        let small = NodeValidator::new(ValidationLimits {
            max_payload_bytes: 10,
            ..ValidationLimits::default()
        });
        assert_eq!(
            small.validate(&genesis, Origin::Local).reason(),
            Some(RejectReason::PayloadTooLarge)
        );
    }

    #[test]
    fn test_identity_binding() {
        let w = Writer::new("t1");
        let mut node = w.create("x", 1);
        node.author.identity_id = IdentityId::from("0000000000000000");
        let node = readdress(node, &w);
        assert_eq!(reason(&node, Origin::Local), Some(RejectReason::IdentityMismatch));

        let mut node = w.create("x", 1);
        node.author.public_key = PublicKey::new(node.author.public_key.as_str().to_uppercase());
        let node = readdress(node, &w);
        assert_eq!(reason(&node, Origin::Local), Some(RejectReason::EncodingViolation));
    }

    #[test]
    fn test_task_and_device_ids() {
        let w = Writer::new("has space");
        assert_eq!(reason(&w.create("x", 1), Origin::Local), Some(RejectReason::SchemaMismatch));
    }

    #[test]
    fn test_signature_rules() {
        let w = Writer::new("t1");
        let mut unsigned = w.create("x", 1);
        unsigned.signature = None;
        assert_eq!(reason(&unsigned, Origin::Local), None);
        assert_eq!(reason(&unsigned, Origin::Remote), Some(RejectReason::MissingSignature));

        let mut forged = w.create("x", 1);
        forged.signature = Some(Signature::from_bytes(&[3; 64]));
        assert_eq!(reason(&forged, Origin::Local), Some(RejectReason::InvalidSignature));
        assert_eq!(reason(&forged, Origin::Remote), Some(RejectReason::InvalidSignature));

        let other = Writer::with_seed(9, "t1");
        let mut wrong_key = w.create("x", 1);
        let body = canonical_body(&wrong_key).unwrap();
        wrong_key.signature = Some(other.signer.sign(&body));
        assert_eq!(reason(&wrong_key, Origin::Remote), Some(RejectReason::InvalidSignature));
    }

    #[test]
    fn test_validator_does_not_mutate() {
        let w = Writer::new("t1");
        let node = w.create("x", 1);
        let before = node.clone();
        let _ = validator().validate(&node, Origin::Remote);
        assert_eq!(node, before);
    }
}
