//! In-process cached client fed by change events.
//!
//! Reads prefer the local TTL cache and fall through to the base client on
//! miss. A background consumer overwrites entries on every change event; a
//! cleanup loop evicts expired entries so an idle user does not pin memory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::client::PermissionRpc;
use crate::errors::ClientError;
use crate::types::{check_permission, CheckPermissionRequest, UserPermission, UserPermissionEvent};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

struct CacheSlot {
    snapshot: UserPermission,
    expires_at: Instant,
}

pub struct LocalCachedClient {
    inner: Arc<dyn PermissionRpc>,
    cache: Arc<RwLock<HashMap<(i64, i64), CacheSlot>>>,
    ttl: Duration,
}

impl LocalCachedClient {
    pub fn new(inner: Arc<dyn PermissionRpc>) -> Self {
        Self::with_ttl(inner, DEFAULT_TTL, DEFAULT_CLEANUP_INTERVAL)
    }

    pub fn with_ttl(
        inner: Arc<dyn PermissionRpc>,
        ttl: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        let cache: Arc<RwLock<HashMap<(i64, i64), CacheSlot>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let sweep = Arc::downgrade(&cache);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(cleanup_interval).await;
                let Some(cache) = sweep.upgrade() else { break };
                let now = Instant::now();
                cache.write().await.retain(|_, slot| slot.expires_at > now);
            }
        });

        Self { inner, cache, ttl }
    }

    /// Subscribes the cache to a change-event stream. Every event
    /// overwrites the entries it carries; the snapshot in an event is the
    /// authoritative latest for that user.
    pub fn spawn_event_listener(
        &self,
        mut events: mpsc::Receiver<UserPermissionEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.cache.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mut guard = cache.write().await;
                for snapshot in event.permissions.into_values() {
                    debug!(user = snapshot.user_id, biz = snapshot.biz_id, "event overwrote local snapshot");
                    guard.insert(
                        (snapshot.biz_id, snapshot.user_id),
                        CacheSlot {
                            snapshot,
                            expires_at: Instant::now() + ttl,
                        },
                    );
                }
            }
        })
    }

    async fn cached(&self, biz_id: i64, user_id: i64) -> Option<UserPermission> {
        let guard = self.cache.read().await;
        let slot = guard.get(&(biz_id, user_id))?;
        if slot.expires_at <= Instant::now() {
            return None;
        }
        Some(slot.snapshot.clone())
    }
}

#[async_trait]
impl PermissionRpc for LocalCachedClient {
    async fn check_permission(
        &self,
        request: &CheckPermissionRequest,
    ) -> Result<bool, ClientError> {
        if let Some(snapshot) = self.cached(request.permission.biz_id, request.uid).await {
            match check_permission(&snapshot, request) {
                Ok(allowed) => return Ok(allowed),
                Err(err) if err.is_unknown_permission_action() => {}
                Err(err) => return Err(err),
            }
        }
        self.inner.check_permission(request).await
    }

    async fn batch_check_permission(
        &self,
        requests: &[CheckPermissionRequest],
    ) -> Result<Vec<bool>, ClientError> {
        self.inner.batch_check_permission(requests).await
    }

    async fn get_all_permissions(
        &self,
        biz_id: i64,
        user_id: i64,
    ) -> Result<UserPermission, ClientError> {
        self.inner.get_all_permissions(biz_id, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests_support::ScriptedRpc;
    use crate::types::{Effect, PermissionEntry, ResourceRef};

    fn snapshot(effect: Effect) -> UserPermission {
        UserPermission {
            user_id: 1001,
            biz_id: 10,
            permissions: vec![PermissionEntry {
                resource: ResourceRef {
                    key: "/a".into(),
                    resource_type: "doc".into(),
                },
                action: "read".into(),
                effect,
            }],
        }
    }

    fn request() -> CheckPermissionRequest {
        CheckPermissionRequest::new(1001, 10, "doc", "/a", vec!["read".to_string()])
    }

    #[tokio::test]
    async fn event_overwrites_and_serves_cache() {
        let base = Arc::new(ScriptedRpc::allowing(false));
        let client = LocalCachedClient::new(base.clone());
        let (tx, rx) = mpsc::channel(8);
        client.spawn_event_listener(rx);

        let mut permissions = HashMap::new();
        permissions.insert("1001".to_string(), snapshot(Effect::Allow));
        tx.send(UserPermissionEvent { permissions }).await.unwrap();

        // Wait for the listener to install the snapshot.
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if client.cached(10, 1001).await.is_some() {
                break;
            }
        }

        assert!(client.check_permission(&request()).await.unwrap());
        assert_eq!(base.check_calls(), 0);
    }

    #[tokio::test]
    async fn miss_falls_through() {
        let base = Arc::new(ScriptedRpc::allowing(true));
        let client = LocalCachedClient::new(base.clone());
        assert!(client.check_permission(&request()).await.unwrap());
        assert_eq!(base.check_calls(), 1);
    }

    #[tokio::test]
    async fn deny_event_flips_the_answer() {
        let base = Arc::new(ScriptedRpc::allowing(true));
        let client = LocalCachedClient::new(base.clone());
        let (tx, rx) = mpsc::channel(8);
        client.spawn_event_listener(rx);

        let mut permissions = HashMap::new();
        permissions.insert("1001".to_string(), snapshot(Effect::Deny));
        tx.send(UserPermissionEvent { permissions }).await.unwrap();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if client.cached(10, 1001).await.is_some() {
                break;
            }
        }

        assert!(!client.check_permission(&request()).await.unwrap());
        assert_eq!(base.check_calls(), 0);
    }

    #[tokio::test]
    async fn expired_entries_fall_through() {
        let base = Arc::new(ScriptedRpc::allowing(true));
        let client = LocalCachedClient::with_ttl(
            base.clone(),
            Duration::from_millis(10),
            Duration::from_secs(3600),
        );
        let (tx, rx) = mpsc::channel(8);
        client.spawn_event_listener(rx);

        let mut permissions = HashMap::new();
        permissions.insert("1001".to_string(), snapshot(Effect::Deny));
        tx.send(UserPermissionEvent { permissions }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The deny snapshot has expired; the base answers.
        assert!(client.check_permission(&request()).await.unwrap());
        assert_eq!(base.check_calls(), 1);
    }
}
