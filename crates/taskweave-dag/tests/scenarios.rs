//! End-to-end replay scenarios and the engine's headline properties.

mod common;

use std::collections::BTreeSet;

use serde_json::json;
use taskweave_dag::{
    Origin, Reconstructor, RejectReason, current_item, history, reconstruct, NodeValidator,
};
use taskweave_types::{Action, EntityStatus, MergeField, Node, TaskId, WallClock};

use common::{T0, Writer};

fn task(id: &str) -> TaskId {
    TaskId::from(id)
}

// ── Scenario A ──────────────────────────────────────────────────────────────

#[test]
fn scenario_a_create_then_item() {
    let w = Writer::new("groceries");
    let genesis = w.create("Buy milk", 3);
    let deadline = WallClock::from_millis(T0).plus_days(7);
    let item = w.item(&genesis, deadline);

    let entities = reconstruct(&[genesis.clone(), item.clone()]);
    let entity = &entities[&task("groceries")];

    assert_eq!(entity.metadata.title, "Buy milk");
    assert_eq!(entity.metadata.priority, 3);
    assert_eq!(entity.items.len(), 1);
    assert!(entity.items[0].is_open());
    assert_eq!(entity.items[0].deadline, deadline);
    assert_eq!(entity.items[0].id, item.id);
    assert_eq!(entity.status(), EntityStatus::Active);
    assert_eq!(entity.heads, vec![item.id.clone()]);
    assert_eq!(entity.genesis, genesis.id);
    assert_eq!(entity.created_by, genesis.author.identity_id);
}

// ── Scenario B ──────────────────────────────────────────────────────────────

#[test]
fn scenario_b_tallest_chain_wins() {
    let w = Writer::new("laundry");
    let genesis = w.create("Laundry", 2);
    let u2 = w.update(&genesis, json!({"priority": 3}));
    let u3 = w.update(&u2, json!({"priority": 4}));
    let u4 = w.update(&u3, json!({"complexity": 2}));
    let u5 = w.update(&u4, json!({"title": "Laundry + ironing"}));

    let deadline = WallClock::from_millis(T0).plus_days(1);
    let at_five = w.item(&u4, deadline);
    let at_six = w.item(&u5, deadline);
    assert_eq!(at_five.timestamp.logical_clock, 5);
    assert_eq!(at_six.timestamp.logical_clock, 6);

    let entities = reconstruct(&[genesis, u2, u3, u4, u5, at_five.clone(), at_six.clone()]);
    let entity = &entities[&task("laundry")];

    assert_eq!(current_item(entity).unwrap().id, at_six.id);
    let h = history(entity);
    assert_eq!(h.len(), 2);
    assert_eq!(h[0].item.id, at_five.id);
    assert!(!h[0].current);
    assert!(h[1].current);
    assert_eq!(entity.heads.len(), 2);
}

#[test]
fn completing_a_non_current_item_still_counts() {
    let w = Writer::new("laundry");
    let genesis = w.create("Laundry", 2);
    let deadline = WallClock::from_millis(T0).plus_days(1);
    let older = w.item(&genesis, deadline);
    let step = w.update(&genesis, json!({"priority": 3}));
    let newer = w.item(&step, deadline);
    let done = w.complete(&older, &older.id);

    let entities = reconstruct(&[genesis, older.clone(), step, newer.clone(), done]);
    let entity = &entities[&task("laundry")];
    assert!(!entity.item(&older.id).unwrap().is_open());
    assert_eq!(current_item(entity).unwrap().id, newer.id);
}

// ── Scenario C ──────────────────────────────────────────────────────────────

#[test]
fn scenario_c_duplicate_genesis_is_the_only_casualty() {
    let w = Writer::new("errand");
    let genesis = w.create("Post letter", 2);
    let first = w.item(&genesis, WallClock::from_millis(T0).plus_days(1));
    let done = w.complete(&first, &first.id);
    let second = w.item(&done, WallClock::from_millis(T0).plus_days(3));
    let history = vec![genesis.clone(), first, done, second];

    // Earlier wall clock than the real genesis, no parents.
    let imposter = w.build(
        Action::Create,
        &[],
        json!({"title": "Imposter", "priority": 5}),
        Some(T0 - 60_000),
    );

    let clean = Reconstructor::default().reconstruct(&history);
    let mut with_imposter = history.clone();
    with_imposter.insert(0, imposter.clone());
    let dirty = Reconstructor::default().reconstruct(&with_imposter);

    assert_eq!(clean.entities, dirty.entities);
    assert_eq!(dirty.report.rejections.len(), 1);
    let rejection = &dirty.report.rejections[0];
    assert_eq!(rejection.node, imposter.id);
    assert_eq!(rejection.reason, RejectReason::DuplicateGenesis);
    assert_eq!(dirty.entities[&task("errand")].metadata.title, "Post letter");
}

// ── Scenario D ──────────────────────────────────────────────────────────────

#[test]
fn scenario_d_delete_then_resurrect() {
    let w = Writer::new("chore");
    let a = w.create("Clean garage", 2);
    let b = w.update(&a, json!({"title": "Clean garage and shed"}));
    let c = w.update(&b, json!({"priority": 4}));
    let tomb = w.delete(&c, &[&a, &b, &c]);

    let deleted = Reconstructor::default().reconstruct(&[a.clone(), b.clone(), c.clone(), tomb.clone()]);
    assert!(deleted.entities.is_empty());
    assert!(deleted.report.rejections.is_empty());
    assert_eq!(
        deleted.report.prunable,
        BTreeSet::from([a.id.clone(), b.id.clone(), c.id.clone()])
    );

    let d = w.update(&b, json!({"complexity": 3}));
    let revived = Reconstructor::default().reconstruct(&[a.clone(), b.clone(), c.clone(), tomb, d.clone()]);
    let entity = &revived.entities[&task("chore")];
    assert_eq!(entity.metadata.title, "Clean garage and shed");
    assert_eq!(entity.metadata.complexity, 3);
    // C's priority change belongs to the deleted branch.
    assert_eq!(entity.metadata.priority, 2);
    assert_eq!(entity.heads, vec![d.id.clone()]);
    assert_eq!(revived.report.prunable, BTreeSet::from([c.id.clone()]));
    assert!(revived.report.inactive.contains(&c.id));
}

// ── Properties ──────────────────────────────────────────────────────────────

fn busy_history() -> Vec<Node> {
    let owner = Writer::new("project");
    let guest = Writer::with_seed(21, "project");
    let g = owner.create("Ship release", 4);
    let i1 = owner.item(&g, WallClock::from_millis(T0).plus_days(2));
    let u1 = guest.update(&g, json!({"title": "Ship release 1.0", "tags": ["work"]}));
    let u2 = owner.update(&i1, json!({"priority": 5}));
    let m = owner.merge(&[&u1, &u2], &g, json!({"strategy": "union"}));
    let c1 = guest.complete(&m, &i1.id);
    let i2 = owner.item(&c1, WallClock::from_millis(T0).plus_days(9));
    let bad = guest.complete(&g, &g.id);
    let after_bad = guest.update(&bad, json!({"title": "never"}));

    let other = Writer::new("side");
    let s = other.create("Side quest", 1);
    let s1 = other.item(&s, WallClock::from_millis(T0).plus_days(1));

    vec![g, i1, u1, u2, m, c1, i2, bad, after_bad, s, s1]
}

#[test]
fn reconstruction_is_deterministic_across_input_orders() {
    let nodes = busy_history();
    let baseline = Reconstructor::default().reconstruct(&nodes);
    let baseline_json = serde_json::to_string(&baseline.entities).unwrap();

    let mut reversed = nodes.clone();
    reversed.reverse();
    let mut rotated = nodes.clone();
    rotated.rotate_left(4);
    let mut doubled = nodes.clone();
    doubled.extend(nodes.iter().cloned());

    for permutation in [reversed, rotated, doubled] {
        let again = Reconstructor::default().reconstruct(&permutation);
        assert_eq!(again.entities, baseline.entities);
        assert_eq!(serde_json::to_string(&again.entities).unwrap(), baseline_json);
        assert_eq!(again.report.rejections, baseline.report.rejections);
    }

    let project = &baseline.entities[&task("project")];
    assert_eq!(project.metadata.title, "Ship release 1.0");
    assert_eq!(project.metadata.priority, 5);
    assert_eq!(project.items.len(), 2);
    assert_eq!(baseline.entities.len(), 2);
}

#[test]
fn every_valid_node_round_trips_its_address() {
    let validator = NodeValidator::default();
    for node in busy_history() {
        assert!(validator.validate(&node, Origin::Remote).is_valid());
        assert_eq!(taskweave_cas::address_node(&node).unwrap(), node.id);

        let mut touched = node.clone();
        touched.timestamp.logical_clock += 1;
        assert_ne!(taskweave_cas::address_node(&touched).unwrap(), node.id);
    }
}

#[test]
fn broken_branch_prunes_descendants_only() {
    let w = Writer::new("fix");
    let genesis = w.create("Fix bike", 2);
    let valid_child = w.update(&genesis, json!({"title": "Fix bike brakes"}));
    // Completing the genesis is never allowed.
    let invalid_grandchild = w.complete(&valid_child, &genesis.id);
    let further = w.update(&invalid_grandchild, json!({"title": "should not apply"}));
    let sibling = w.update(&genesis, json!({"priority": 5}));

    let out = Reconstructor::default().reconstruct(&[
        genesis,
        valid_child,
        invalid_grandchild.clone(),
        further.clone(),
        sibling,
    ]);
    let entity = &out.entities[&task("fix")];
    assert_eq!(entity.metadata.title, "Fix bike brakes");
    assert_eq!(entity.metadata.priority, 5);

    let root = out.report.rejection(&invalid_grandchild.id).unwrap();
    assert_eq!(root.reason, RejectReason::InvalidItemReference);
    let pruned = out.report.rejection(&further.id).unwrap();
    assert_eq!(pruned.reason, RejectReason::BrokenBranch);
    assert_eq!(pruned.poison_root.as_ref(), Some(&invalid_grandchild.id));
    assert_eq!(out.report.rejections.len(), 2);
}

#[test]
fn merge_result_ignores_parent_declaration_order() {
    let w = Writer::new("trip");
    let g = w.create("Plan trip", 2);
    let p1 = w.update(&g, json!({"title": "Plan trip to Oslo", "tags": ["travel"]}));
    let p2 = w.update(&g, json!({"title": "Plan trip to Bergen", "priority": 4, "tags": ["fjords"]}));

    for strategy in ["last-write-wins", "union", "max", "min", "manual"] {
        let forward = w.merge(&[&p1, &p2], &g, json!({"strategy": strategy}));
        let backward = w.merge(&[&p2, &p1], &g, json!({"strategy": strategy}));
        let a = reconstruct(&[g.clone(), p1.clone(), p2.clone(), forward]);
        let b = reconstruct(&[g.clone(), p1.clone(), p2.clone(), backward]);
        let (a, b) = (&a[&task("trip")], &b[&task("trip")]);
        assert_eq!(a.metadata, b.metadata, "{strategy}");
        assert_eq!(a.pending_conflicts, b.pending_conflicts, "{strategy}");
    }

    let manual = w.merge(&[&p1, &p2], &g, json!({"strategy": "manual"}));
    let out = reconstruct(&[g.clone(), p1.clone(), p2.clone(), manual.clone()]);
    let entity = &out[&task("trip")];
    assert_eq!(entity.metadata.title, "Plan trip");
    assert!(entity.pending_conflicts.contains(&MergeField::Title));
    assert_eq!(entity.metadata.priority, 4);

    let resolved = w.merge(
        &[&manual, &p2],
        &g,
        json!({"resolutions": {"title": "Plan trip to Norway"}}),
    );
    let out = reconstruct(&[g, p1, p2, manual, resolved]);
    let entity = &out[&task("trip")];
    assert_eq!(entity.metadata.title, "Plan trip to Norway");
    assert!(!entity.pending_conflicts.contains(&MergeField::Title));
}
