//! Reload, event fan-out, and failover behavior across the cache tiers.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use apsis::cache::keys;
use apsis::cache::kv::{FaultKv, KvStore, MemoryKv};
use apsis::cache::multilevel::{Loader, MultiLevelCache, MultiLevelConfig};
use apsis::cache::session::SessionPermissionCache;
use apsis::engine::types::Effect;
use apsis::events::bus::{EventBus, MemoryBus};
use apsis::events::consumers::spawn_user_permission_consumer;
use apsis::events::types::UserPermissionEvent;
use apsis::store;
use helpers::db::TestDb;
use tokio::sync::watch;

const BIZ: i64 = 10;
const USER: i64 = 1001;

fn test_multilevel(
    remote: Arc<dyn KvStore>,
    loader: Loader,
) -> (MultiLevelCache, watch::Sender<bool>) {
    // The sender must outlive the test; dropping it would fire the
    // shutdown channel and kill the pinger.
    let (tx, rx) = watch::channel(false);
    let cache = MultiLevelCache::new(
        remote,
        loader,
        MultiLevelConfig {
            refresh_interval: Duration::from_millis(20),
            ping_interval: Duration::from_millis(20),
            ring_size: 4,
            ring_threshold: 0.5,
            ring_min_errors: 3,
        },
        rx,
    );
    (cache, tx)
}

/// S7: ring trips after a burst of remote errors, the next read is served
/// from the warmed in-process tier, and after one successful ping a fresh
/// write lands remotely again.
#[tokio::test]
async fn s7_multilevel_failover_and_recovery() {
    let backing = Arc::new(MemoryKv::new());
    let remote = Arc::new(FaultKv::new(backing.clone()));
    let loader: Loader =
        Arc::new(|| Box::pin(async { Ok(vec![("k".to_string(), "warm".to_string())]) }));
    let (cache, _shutdown) = test_multilevel(remote.clone(), loader);

    remote.set_failing(true);
    for _ in 0..3 {
        let _ = cache.get("k").await;
    }
    assert!(!cache.remote_available());
    assert_eq!(cache.get("k").await.unwrap(), "warm");

    remote.set_failing(false);
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if cache.remote_available() {
            break;
        }
    }
    assert!(cache.remote_available());

    cache.set("k2", "v2").await.unwrap();
    assert_eq!(backing.get("k2").await.unwrap(), "v2");
}

/// Property 5: after reload returns, the snapshot visible in the session
/// tier reflects the repository state at reload time, and the change event
/// carries it to every other consumer tier.
#[tokio::test]
async fn reload_publishes_fresh_snapshots_to_all_tiers() {
    let db = TestDb::new().await;
    let bus = Arc::new(MemoryBus::new());
    let primary_kv = Arc::new(MemoryKv::new());
    let sessions = SessionPermissionCache::new(
        primary_kv.clone(),
        bus.clone(),
        "user-permissions".to_string(),
    );

    // A sibling tier fed only by the change-event stream.
    let sibling_kv: Arc<MemoryKv> = Arc::new(MemoryKv::new());
    let (_stop_tx, stop_rx) = watch::channel(false);
    spawn_user_permission_consumer(
        bus.clone(),
        "user-permissions".to_string(),
        sibling_kv.clone(),
        stop_rx,
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Seed a role grant, then reload.
    let resource =
        store::resources::create_resource(db.connection(), BIZ, "doc", "/a", "doc a", "", "")
            .await
            .unwrap();
    let permission = store::permissions::create_permission(
        db.connection(),
        BIZ,
        "read doc a",
        "",
        &resource,
        "read",
        "",
    )
    .await
    .unwrap();
    let role = store::roles::create_role(db.connection(), BIZ, "custom", "reader", "", "", 0, 0)
        .await
        .unwrap();
    store::roles::add_role_permission(db.connection(), BIZ, role.id, &permission)
        .await
        .unwrap();
    store::users::grant_user_role(db.connection(), BIZ, USER, role.id, 0, 0)
        .await
        .unwrap();

    sessions
        .reload(db.connection(), BIZ, &[USER], store::now_ms())
        .await
        .unwrap();

    // Primary tier sees the fresh snapshot immediately.
    let snapshot = sessions.get(BIZ, USER).await.expect("snapshot missing");
    assert_eq!(snapshot.permissions.len(), 1);
    assert_eq!(snapshot.permissions[0].effect, Effect::Allow);
    assert_eq!(snapshot.permissions[0].resource.key, "/a");

    // The sibling tier converges through the event.
    let field = BIZ.to_string();
    let key = keys::session(USER);
    let mut sibling_json = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if let Ok(json) = sibling_kv.hget(&key, &field).await {
            sibling_json = Some(json);
            break;
        }
    }
    let sibling_json = sibling_json.expect("event never reached the sibling tier");
    let sibling_snapshot: apsis::events::types::UserPermissionSnapshot =
        serde_json::from_str(&sibling_json).unwrap();
    assert_eq!(sibling_snapshot, snapshot);
}

/// Late duplicates idempotently re-install the same snapshot.
#[tokio::test]
async fn duplicate_events_are_idempotent() {
    let bus = Arc::new(MemoryBus::new());
    let kv: Arc<MemoryKv> = Arc::new(MemoryKv::new());
    let (_stop_tx, stop_rx) = watch::channel(false);
    spawn_user_permission_consumer(bus.clone(), "topic".to_string(), kv.clone(), stop_rx);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut permissions = std::collections::HashMap::new();
    permissions.insert(
        USER.to_string(),
        apsis::events::types::UserPermissionSnapshot {
            user_id: USER,
            biz_id: BIZ,
            permissions: vec![],
        },
    );
    let payload = serde_json::to_vec(&UserPermissionEvent { permissions }).unwrap();
    bus.publish("topic", &payload).await.unwrap();
    bus.publish("topic", &payload).await.unwrap();

    let key = keys::session(USER);
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if kv.hget(&key, &BIZ.to_string()).await.is_ok() {
            break;
        }
    }
    let json = kv.hget(&key, &BIZ.to_string()).await.unwrap();
    let snapshot: apsis::events::types::UserPermissionSnapshot =
        serde_json::from_str(&json).unwrap();
    assert_eq!(snapshot.user_id, USER);
}
