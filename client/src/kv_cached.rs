//! Remote-snapshot-cached client.
//!
//! Checks are answered from a per-(biz, user) snapshot in the shared
//! snapshot store when possible; a miss or an incomplete snapshot falls
//! through to the base client, and an allow from the base merges the
//! newly proven allows back into the cached permission list.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::client::PermissionRpc;
use crate::errors::ClientError;
use crate::types::{
    check_permission, user_permissions_key, CheckPermissionRequest, Effect, PermissionEntry,
    ResourceRef, UserPermission,
};

/// The remote snapshot store seam (a Redis hash in production).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    inner: RwLock<HashMap<String, String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.inner.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct KvCachedClient {
    inner: Arc<dyn PermissionRpc>,
    store: Arc<dyn SnapshotStore>,
}

impl KvCachedClient {
    pub fn new(inner: Arc<dyn PermissionRpc>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { inner, store }
    }

    async fn cached_snapshot(&self, biz_id: i64, user_id: i64) -> Option<UserPermission> {
        let key = user_permissions_key(biz_id, user_id);
        match self.store.get(&key).await {
            Ok(Some(json)) => serde_json::from_str(&json).ok(),
            Ok(None) => None,
            Err(err) => {
                debug!(%err, "snapshot store read failed; falling through");
                None
            }
        }
    }

    /// Merges the allows the base client just proved into the snapshot.
    async fn write_through(&self, request: &CheckPermissionRequest) {
        let biz_id = request.permission.biz_id;
        let mut snapshot = self
            .cached_snapshot(biz_id, request.uid)
            .await
            .unwrap_or(UserPermission {
                user_id: request.uid,
                biz_id,
                permissions: Vec::new(),
            });
        for action in &request.permission.actions {
            let already = snapshot.permissions.iter().any(|entry| {
                entry.resource.resource_type == request.permission.resource_type
                    && entry.resource.key == request.permission.resource_key
                    && entry.action == *action
            });
            if !already {
                snapshot.permissions.push(PermissionEntry {
                    resource: ResourceRef {
                        key: request.permission.resource_key.clone(),
                        resource_type: request.permission.resource_type.clone(),
                    },
                    action: action.clone(),
                    effect: Effect::Allow,
                });
            }
        }
        let key = user_permissions_key(biz_id, request.uid);
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(err) = self.store.set(&key, &json).await {
                    debug!(%err, "snapshot store write failed");
                }
            }
            Err(err) => debug!(%err, "snapshot serialization failed"),
        }
    }
}

#[async_trait]
impl PermissionRpc for KvCachedClient {
    async fn check_permission(
        &self,
        request: &CheckPermissionRequest,
    ) -> Result<bool, ClientError> {
        if let Some(snapshot) = self
            .cached_snapshot(request.permission.biz_id, request.uid)
            .await
        {
            match check_permission(&snapshot, request) {
                Ok(allowed) => return Ok(allowed),
                Err(err) if err.is_unknown_permission_action() => {}
                Err(err) => return Err(err),
            }
        }
        let allowed = self.inner.check_permission(request).await?;
        if allowed {
            self.write_through(request).await;
        }
        Ok(allowed)
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

    fn request() -> CheckPermissionRequest {
        CheckPermissionRequest::new(1001, 10, "doc", "/a", vec!["read".to_string()])
    }

    #[tokio::test]
    async fn cache_hit_skips_the_base() {
        let base = Arc::new(ScriptedRpc::allowing(false));
        let store = Arc::new(MemorySnapshotStore::new());
        let snapshot = UserPermission {
            user_id: 1001,
            biz_id: 10,
            permissions: vec![PermissionEntry {
                resource: ResourceRef {
                    key: "/a".into(),
                    resource_type: "doc".into(),
                },
                action: "read".into(),
                effect: Effect::Allow,
            }],
        };
        store
            .set(
                &user_permissions_key(10, 1001),
                &serde_json::to_string(&snapshot).unwrap(),
            )
            .await
            .unwrap();

        let client = KvCachedClient::new(base.clone(), store);
        assert!(client.check_permission(&request()).await.unwrap());
        assert_eq!(base.check_calls(), 0);
    }

    #[tokio::test]
    async fn miss_falls_through_and_writes_back_allows() {
        let base = Arc::new(ScriptedRpc::allowing(true));
        let store = Arc::new(MemorySnapshotStore::new());
        let client = KvCachedClient::new(base.clone(), store.clone());

        assert!(client.check_permission(&request()).await.unwrap());
        assert_eq!(base.check_calls(), 1);

        // The proven allow is now cached; the next check skips the base.
        assert!(client.check_permission(&request()).await.unwrap());
        assert_eq!(base.check_calls(), 1);
    }

    #[tokio::test]
    async fn denied_answer_is_not_written_back() {
        let base = Arc::new(ScriptedRpc::allowing(false));
        let store = Arc::new(MemorySnapshotStore::new());
        let client = KvCachedClient::new(base.clone(), store.clone());

        assert!(!client.check_permission(&request()).await.unwrap());
        assert!(store
            .get(&user_permissions_key(10, 1001))
            .await
            .unwrap()
            .is_none());
    }
}
