//! Peers converging through an in-process relay.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taskweave_kernel::{
    HubReplicator, KernelConfig, KernelError, MemoryHub, SyncConfig, SyncEngine, TaskKernel,
};
use taskweave_types::{Action, WallClock};

use common::{config, memory_kernel, payload, signer, task};

fn engine(kernel: &Arc<TaskKernel>, hub: &Arc<MemoryHub>) -> (SyncEngine, Arc<HubReplicator>) {
    let replicator = Arc::new(hub.connect());
    let engine = SyncEngine::new(kernel.clone(), replicator.clone());
    (engine, replicator)
}

#[tokio::test]
async fn two_peers_converge_through_the_hub() {
    let hub = MemoryHub::new();
    let a = memory_kernel(1, "a").await;
    let b = memory_kernel(2, "b").await;
    let (sync_a, _) = engine(&a, &hub);
    let (sync_b, _) = engine(&b, &hub);
    let t = task("report");

    a.originate(&t, payload(Action::Create, json!({"title": "Q3 report", "priority": 4})))
        .await
        .unwrap();
    let round = sync_a.sync_once().await.unwrap();
    assert_eq!(round.pushed, 1);
    assert_eq!(hub.len(), 1);

    let round = sync_b.sync_once().await.unwrap();
    assert_eq!(round.pulled, 1);
    assert_eq!(round.added, 1);
    assert_eq!(b.entity(&t).unwrap().metadata.title, "Q3 report");

    b.originate(&t, payload(Action::Update, json!({"complexity": 3})))
        .await
        .unwrap();
    sync_b.sync_once().await.unwrap();
    sync_a.sync_once().await.unwrap();

    assert_eq!(a.entity(&t), b.entity(&t));
    assert_eq!(a.entity(&t).unwrap().metadata.complexity, 3);

    let idle = sync_a.sync_once().await.unwrap();
    assert_eq!(idle.pushed, 0);
    assert_eq!(idle.added, 0);
}

#[tokio::test]
async fn offline_peer_keeps_working_and_catches_up() {
    let hub = MemoryHub::new();
    let a = memory_kernel(1, "a").await;
    let b = memory_kernel(2, "b").await;
    let (sync_a, link_a) = engine(&a, &hub);
    let (sync_b, _) = engine(&b, &hub);
    let t = task("errand");

    link_a.set_online(false);
    a.originate(&t, payload(Action::Create, json!({"title": "Post office", "priority": 2})))
        .await
        .unwrap();
    a.originate(&t, payload(Action::Update, json!({"priority": 3})))
        .await
        .unwrap();
    assert!(matches!(sync_a.sync_once().await, Err(KernelError::Replication(_))));
    assert!(hub.is_empty());
    assert_eq!(a.entity(&t).unwrap().metadata.priority, 3);

    link_a.set_online(true);
    let round = sync_a.sync_once().await.unwrap();
    assert_eq!(round.pushed, 2);

    sync_b.sync_once().await.unwrap();
    assert_eq!(a.entity(&t), b.entity(&t));
}

#[tokio::test]
async fn branch_from_deleted_history_is_refetched_after_prune() {
    let hub = MemoryHub::new();
    let a = memory_kernel(1, "a").await;
    let b = memory_kernel(2, "b").await;
    let (sync_a, _) = engine(&a, &hub);
    let (sync_b, _) = engine(&b, &hub);
    let t = task("garden");

    let genesis = a
        .originate(&t, payload(Action::Create, json!({"title": "Garden", "priority": 2})))
        .await
        .unwrap();
    let first = a
        .originate(&t, payload(Action::Update, json!({"tags": ["spring"]})))
        .await
        .unwrap();
    a.originate(&t, payload(Action::Update, json!({"priority": 1})))
        .await
        .unwrap();
    sync_a.sync_once().await.unwrap();
    sync_b.sync_once().await.unwrap();

    a.delete(&t).await.unwrap();
    assert_eq!(a.prune().await.unwrap().len(), 3);
    sync_a.sync_once().await.unwrap();

    let branch = b
        .originate_at(
            &t,
            vec![first.id.clone()],
            payload(Action::Update, json!({"priority": 5})),
            WallClock::now(),
        )
        .await
        .unwrap();
    sync_b.sync_once().await.unwrap();

    let round = sync_a.sync_once().await.unwrap();
    assert_eq!(round.refetched, 2);
    assert!(a.nodes().contains(&genesis.id));
    assert!(a.nodes().contains(&first.id));
    assert!(a.nodes().contains(&branch.id));

    let entity = a.entity(&t).unwrap();
    assert_eq!(entity.heads, vec![branch.id.clone()]);
    assert_eq!(entity.metadata.priority, 5);
    assert_eq!(a.entity(&t), b.entity(&t));
}

#[tokio::test]
async fn spawned_engines_follow_each_other() {
    let hub = MemoryHub::new();
    let fast = |device: &str| KernelConfig {
        sync: SyncConfig {
            enabled: true,
            pull_interval_ms: 10,
        },
        ..config(device)
    };
    let a = Arc::new(TaskKernel::open(fast("a"), signer(1)).await.unwrap());
    let b = Arc::new(TaskKernel::open(fast("b"), signer(2)).await.unwrap());
    let (sync_a, _) = engine(&a, &hub);
    let (sync_b, _) = engine(&b, &hub);
    let handle_a = Arc::new(sync_a).spawn();
    let handle_b = Arc::new(sync_b).spawn();
    let t = task("live");

    a.originate(&t, payload(Action::Create, json!({"title": "Live", "priority": 2})))
        .await
        .unwrap();

    let converged = tokio::time::timeout(Duration::from_secs(5), async {
        while b.entity(&t).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(converged.is_ok());
    assert_eq!(a.entity(&t), b.entity(&t));

    handle_a.abort();
    handle_b.abort();
}

#[tokio::test]
async fn disabled_sync_never_touches_the_backend() {
    let hub = MemoryHub::new();
    let cfg = KernelConfig {
        sync: SyncConfig {
            enabled: false,
            ..SyncConfig::default()
        },
        ..config("quiet")
    };
    let kernel = Arc::new(TaskKernel::open(cfg, signer(3)).await.unwrap());
    let (sync, _) = engine(&kernel, &hub);

    Arc::new(sync).spawn().await.unwrap();
    kernel
        .originate(&task("t"), payload(Action::Create, json!({"title": "Local", "priority": 2})))
        .await
        .unwrap();
    assert!(hub.is_empty());
}
