//! Distributed in-process cache over a consistent-hash ring.
//!
//! Sibling SDK processes share one cache cluster: a key's owner is picked
//! by the ring, non-owners reach it through a peer seam. Missing keys are
//! filled from the authoritative `GetAllPermissions` RPC and cached at the
//! owner.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::client::PermissionRpc;
use crate::errors::ClientError;
use crate::ring::HashRing;
use crate::types::{check_permission, user_permissions_key, CheckPermissionRequest, UserPermission};

/// A sibling process's cache endpoint.
#[async_trait]
pub trait PeerCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
}

/// This process's own shard of the cluster.
#[derive(Default)]
pub struct LocalShard {
    inner: RwLock<HashMap<String, String>>,
}

impl LocalShard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeerCache for LocalShard {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.inner.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct GroupCachedClient {
    inner: Arc<dyn PermissionRpc>,
    self_name: String,
    local: Arc<LocalShard>,
    ring: RwLock<HashRing>,
    peers: RwLock<HashMap<String, Arc<dyn PeerCache>>>,
}

impl GroupCachedClient {
    pub fn new(inner: Arc<dyn PermissionRpc>, self_name: impl Into<String>) -> Self {
        let self_name = self_name.into();
        let mut ring = HashRing::new();
        ring.add(&self_name);
        Self {
            inner,
            self_name,
            local: Arc::new(LocalShard::new()),
            ring: RwLock::new(ring),
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_peer(&self, name: impl Into<String>, peer: Arc<dyn PeerCache>) {
        let name = name.into();
        self.ring.write().await.add(&name);
        self.peers.write().await.insert(name, peer);
    }

    pub async fn remove_peer(&self, name: &str) {
        self.ring.write().await.remove(name);
        self.peers.write().await.remove(name);
    }

    /// Replaces the cluster membership; names are authoritative, so the
    /// ring and peer map drop anything not in the new set.
    pub async fn replace_peers(&self, peers: Vec<(String, Arc<dyn PeerCache>)>) {
        let mut names: Vec<String> = peers.iter().map(|(name, _)| name.clone()).collect();
        names.push(self.self_name.clone());
        self.ring.write().await.replace_all(&names);
        let mut map = self.peers.write().await;
        map.clear();
        for (name, peer) in peers {
            map.insert(name, peer);
        }
    }

    async fn shard_for(&self, key: &str) -> Option<Arc<dyn PeerCache>> {
        let ring = self.ring.read().await;
        let owner = ring.node_for(key)?;
        if owner == self.self_name {
            return Some(self.local.clone() as Arc<dyn PeerCache>);
        }
        self.peers.read().await.get(owner).cloned()
    }

    async fn snapshot_for(
        &self,
        biz_id: i64,
        user_id: i64,
    ) -> Result<Option<UserPermission>, ClientError> {
        let key = user_permissions_key(biz_id, user_id);
        // The key itself names (biz, user); a shard handed a foreign key
        // rejects it rather than serving garbage.
        let (key_biz, key_user) = crate::types::parse_user_permissions_key(&key)?;
        debug_assert_eq!((key_biz, key_user), (biz_id, user_id));

        let Some(shard) = self.shard_for(&key).await else {
            return Ok(None);
        };
        if let Some(json) = shard.get(&key).await? {
            if let Ok(snapshot) = serde_json::from_str(&json) {
                return Ok(Some(snapshot));
            }
        }

        // Fill from the authoritative RBAC service and cache at the owner.
        let snapshot = self.inner.get_all_permissions(biz_id, user_id).await?;
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(err) = shard.set(&key, &json).await {
                    debug!(%err, "group shard write failed");
                }
            }
            Err(err) => debug!(%err, "snapshot serialization failed"),
        }
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl PermissionRpc for GroupCachedClient {
    async fn check_permission(
        &self,
        request: &CheckPermissionRequest,
    ) -> Result<bool, ClientError> {
        if let Some(snapshot) = self
            .snapshot_for(request.permission.biz_id, request.uid)
            .await?
        {
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

    fn allow_snapshot() -> UserPermission {
        UserPermission {
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
        }
    }

    fn request() -> CheckPermissionRequest {
        CheckPermissionRequest::new(1001, 10, "doc", "/a", vec!["read".to_string()])
    }

    #[tokio::test]
    async fn fills_from_get_all_permissions_and_caches() {
        let base = Arc::new(ScriptedRpc::with_snapshot(false, allow_snapshot()));
        let client = GroupCachedClient::new(base.clone(), "node-a");

        assert!(client.check_permission(&request()).await.unwrap());
        // Answered from the filled snapshot, not the base check.
        assert_eq!(base.check_calls(), 0);

        // Second check hits the cached shard entry.
        assert!(client.check_permission(&request()).await.unwrap());
        assert_eq!(base.check_calls(), 0);
    }

    #[tokio::test]
    async fn peer_owned_keys_route_to_the_peer() {
        let base = Arc::new(ScriptedRpc::with_snapshot(false, allow_snapshot()));
        let client = GroupCachedClient::new(base.clone(), "node-a");
        let peer = Arc::new(LocalShard::new());
        // Only the peer is on the ring besides us; preload it.
        let key = user_permissions_key(10, 1001);
        peer.set(&key, &serde_json::to_string(&allow_snapshot()).unwrap())
            .await
            .unwrap();
        client.add_peer("node-b", peer.clone()).await;

        assert!(client.check_permission(&request()).await.unwrap());
    }

    #[tokio::test]
    async fn replace_peers_drops_stale_names() {
        let base = Arc::new(ScriptedRpc::with_snapshot(false, allow_snapshot()));
        let client = GroupCachedClient::new(base, "node-a");
        client.add_peer("node-b", Arc::new(LocalShard::new())).await;
        client.add_peer("node-c", Arc::new(LocalShard::new())).await;

        client
            .replace_peers(vec![("node-b".to_string(), Arc::new(LocalShard::new()) as _)])
            .await;

        let ring = client.ring.read().await;
        assert!(ring.contains("node-a"));
        assert!(ring.contains("node-b"));
        assert!(!ring.contains("node-c"));
    }
}
