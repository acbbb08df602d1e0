//! Per-user permission snapshots and the reload path.
//!
//! Snapshots live in the cache fabric under `permission:session:<uid>`,
//! hashed by business id so a user's businesses do not collide. Reads
//! resolve through the RBAC engine on miss and write through; mutations
//! call [`SessionPermissionCache::reload`], which recomputes, installs, and
//! publishes the new snapshots after the repository change has committed.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::ConnectionTrait;
use tracing::{debug, warn};

use super::keys;
use super::kv::KvStore;
use crate::engine::rbac;
use crate::errors::ApsisError;
use crate::events::bus::EventBus;
use crate::events::types::{UserPermissionEvent, UserPermissionSnapshot};

pub struct SessionPermissionCache {
    kv: Arc<dyn KvStore>,
    bus: Arc<dyn EventBus>,
    topic: String,
}

impl SessionPermissionCache {
    pub fn new(kv: Arc<dyn KvStore>, bus: Arc<dyn EventBus>, topic: String) -> Self {
        Self { kv, bus, topic }
    }

    /// The cached snapshot, if present and parseable. Cache errors degrade
    /// to a miss; the caller re-resolves against the store.
    pub async fn get(&self, biz_id: i64, user_id: i64) -> Option<UserPermissionSnapshot> {
        match self.kv.hget(&keys::session(user_id), &biz_id.to_string()).await {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    warn!(user_id, biz_id, %err, "discarding unparseable session snapshot");
                    None
                }
            },
            Err(err) => {
                if !err.is_key_not_found() {
                    debug!(user_id, biz_id, %err, "session cache read failed");
                }
                None
            }
        }
    }

    /// Read path: cached snapshot, or resolve via RBAC and write through.
    pub async fn get_or_resolve(
        &self,
        db: &impl ConnectionTrait,
        biz_id: i64,
        user_id: i64,
        now_ms: i64,
    ) -> Result<UserPermissionSnapshot, ApsisError> {
        if let Some(snapshot) = self.get(biz_id, user_id).await {
            return Ok(snapshot);
        }
        let snapshot = self.resolve(db, biz_id, user_id, now_ms).await?;
        self.install(&snapshot).await;
        Ok(snapshot)
    }

    async fn resolve(
        &self,
        db: &impl ConnectionTrait,
        biz_id: i64,
        user_id: i64,
        now_ms: i64,
    ) -> Result<UserPermissionSnapshot, ApsisError> {
        let effective = rbac::resolve_user_permissions(db, biz_id, user_id, now_ms).await?;
        Ok(UserPermissionSnapshot::from_effective(biz_id, user_id, &effective))
    }

    /// Writes a snapshot into the fabric. Failures degrade silently; the
    /// snapshot is still valid for the caller that computed it.
    pub async fn install(&self, snapshot: &UserPermissionSnapshot) {
        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "session snapshot serialization failed");
                return;
            }
        };
        if let Err(err) = self
            .kv
            .hset(
                &keys::session(snapshot.user_id),
                &snapshot.biz_id.to_string(),
                &json,
            )
            .await
        {
            warn!(user = snapshot.user_id, %err, "session cache write failed");
        }
    }

    /// Write path: recompute each user's snapshot, install it, then publish
    /// one change event carrying all of them. Publication happens after the
    /// repository mutation has committed, so consumers always install state
    /// at least as new as the store at reload time.
    pub async fn reload(
        &self,
        db: &impl ConnectionTrait,
        biz_id: i64,
        user_ids: &[i64],
        now_ms: i64,
    ) -> Result<(), ApsisError> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let mut permissions = HashMap::with_capacity(user_ids.len());
        for &user_id in user_ids {
            let snapshot = self.resolve(db, biz_id, user_id, now_ms).await?;
            self.install(&snapshot).await;
            permissions.insert(user_id.to_string(), snapshot);
        }
        let event = UserPermissionEvent { permissions };
        let payload = serde_json::to_vec(&event)?;
        self.bus.publish(&self.topic, &payload).await?;
        Ok(())
    }
}
