//! Long-lived consumer loops over the event bus.
//!
//! Each consumer commits after successful handling. A payload that fails to
//! parse is a poison pill: it is logged and committed so it cannot block the
//! queue head. Transient handler errors leave the delivery uncommitted (it
//! is requeued) and back off before retrying.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use super::bus::{EventBus, Subscription};
use super::types::{PolicyHotKeyEvent, UserPermissionEvent};
use crate::cache::hot::PolicyHotCache;
use crate::cache::keys;
use crate::cache::kv::KvStore;
use crate::errors::ApsisError;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Drives one subscription until shutdown. The handler's error decides the
/// commit: parse errors commit (poison pill), everything else retries.
pub async fn run_consumer<F, Fut>(
    name: &str,
    mut sub: Subscription,
    mut shutdown: watch::Receiver<bool>,
    handler: F,
) where
    F: Fn(Vec<u8>) -> Fut,
    Fut: std::future::Future<Output = Result<(), ApsisError>>,
{
    loop {
        let payload = tokio::select! {
            _ = shutdown.changed() => break,
            payload = sub.next() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };
        match handler(payload.clone()).await {
            Ok(()) => {}
            Err(ApsisError::Serde(err)) => {
                // Poison pill: commit so the queue head moves on.
                error!(consumer = name, %err, "dropping unparseable event");
            }
            Err(err) => {
                warn!(consumer = name, %err, "event handling failed; will retry");
                sub.requeue(payload).await;
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
    }
    debug!(consumer = name, "consumer stopped");
}

/// Installs every snapshot of an incoming user-permission event into the
/// session cache. Re-installing the same snapshot is idempotent, so
/// out-of-order or duplicate deliveries are harmless.
pub fn spawn_user_permission_consumer(
    bus: Arc<dyn EventBus>,
    topic: String,
    kv: Arc<dyn KvStore>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let sub = bus.subscribe(&topic).await;
        run_consumer("user-permissions", sub, shutdown, move |payload| {
            let kv = kv.clone();
            async move {
                let event: UserPermissionEvent = serde_json::from_slice(&payload)?;
                for snapshot in event.permissions.values() {
                    let json = serde_json::to_string(snapshot)?;
                    kv.hset(
                        &keys::session(snapshot.user_id),
                        &snapshot.biz_id.to_string(),
                        &json,
                    )
                    .await?;
                }
                Ok(())
            }
        })
        .await;
    })
}

/// Warms the local policy cache for every biz id announced on the hot-key
/// topic.
pub fn spawn_policy_hotkey_consumer(
    bus: Arc<dyn EventBus>,
    topic: String,
    db: DatabaseConnection,
    hot: Arc<PolicyHotCache>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let sub = bus.subscribe(&topic).await;
        run_consumer("policy-hotkeys", sub, shutdown, move |payload| {
            let db = db.clone();
            let hot = hot.clone();
            async move {
                let event: PolicyHotKeyEvent = serde_json::from_slice(&payload)?;
                for biz_id in event.biz_ids {
                    hot.warm(&db, biz_id).await?;
                }
                Ok(())
            }
        })
        .await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::MemoryBus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn poison_payload_commits_and_moves_on() {
        let bus = Arc::new(MemoryBus::new());
        let sub = bus.subscribe("t").await;
        let (stop_tx, stop_rx) = watch::channel(false);
        let handled = Arc::new(AtomicUsize::new(0));

        let handled_in_task = handled.clone();
        let task = tokio::spawn(run_consumer("test", sub, stop_rx, move |payload| {
            let handled = handled_in_task.clone();
            async move {
                let _event: UserPermissionEvent = serde_json::from_slice(&payload)?;
                handled.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        bus.publish("t", b"not json").await.unwrap();
        bus.publish("t", br#"{"permissions":{}}"#).await.unwrap();

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if handled.load(Ordering::SeqCst) == 1 {
                break;
            }
        }
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        stop_tx.send(true).unwrap();
        let _ = task.await;
    }

    #[tokio::test]
    async fn transient_error_retries() {
        let bus = Arc::new(MemoryBus::new());
        let sub = bus.subscribe("t").await;
        let (stop_tx, stop_rx) = watch::channel(false);
        let attempts = Arc::new(AtomicUsize::new(0));

        let attempts_in_task = attempts.clone();
        let task = tokio::spawn(run_consumer("test", sub, stop_rx, move |_payload| {
            let attempts = attempts_in_task.clone();
            async move {
                // Fail the first delivery, succeed on redelivery.
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ApsisError::Cache("transient".into()))
                } else {
                    Ok(())
                }
            }
        }));

        bus.publish("t", b"payload").await.unwrap();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if attempts.load(Ordering::SeqCst) >= 2 {
                break;
            }
        }
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        stop_tx.send(true).unwrap();
        let _ = task.await;
    }
}
