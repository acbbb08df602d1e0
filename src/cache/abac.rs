//! Cache-aside layer for ABAC attribute values and definitions.
//!
//! The decision engine reads bags through here; admin mutations invalidate
//! the affected key so the next check reloads from the store. Cache errors
//! degrade silently to the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::ConnectionTrait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::keys;
use super::kv::KvStore;
use crate::engine::types::AttributeDef;
use crate::entities;
use crate::errors::ApsisError;
use crate::store;

pub struct AbacCache {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl AbacCache {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.kv.get(key).await {
            Ok(json) => serde_json::from_str(&json).ok(),
            Err(err) => {
                if !err.is_key_not_found() {
                    debug!(key, %err, "abac cache read failed");
                }
                None
            }
        }
    }

    async fn fill<T: Serialize>(&self, key: &str, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            if let Err(err) = self.kv.set_ex(key, &json, self.ttl).await {
                debug!(key, %err, "abac cache write failed");
            }
        }
    }

    pub async fn subject_values(
        &self,
        db: &impl ConnectionTrait,
        biz_id: i64,
        subject_id: i64,
    ) -> Result<Vec<entities::subject_attribute_value::Model>, ApsisError> {
        let key = keys::abac_subject_attrs(biz_id, subject_id);
        if let Some(values) = self.cached(&key).await {
            return Ok(values);
        }
        let values = store::attributes::subject_values(db, biz_id, subject_id).await?;
        self.fill(&key, &values).await;
        Ok(values)
    }

    pub async fn resource_values(
        &self,
        db: &impl ConnectionTrait,
        biz_id: i64,
        resource_id: i64,
    ) -> Result<Vec<entities::resource_attribute_value::Model>, ApsisError> {
        let key = keys::abac_resource_attrs(biz_id, resource_id);
        if let Some(values) = self.cached(&key).await {
            return Ok(values);
        }
        let values = store::attributes::resource_values(db, biz_id, resource_id).await?;
        self.fill(&key, &values).await;
        Ok(values)
    }

    pub async fn environment_values(
        &self,
        db: &impl ConnectionTrait,
        biz_id: i64,
    ) -> Result<Vec<entities::environment_attribute_value::Model>, ApsisError> {
        let key = keys::abac_environment_attrs(biz_id);
        if let Some(values) = self.cached(&key).await {
            return Ok(values);
        }
        let values = store::attributes::environment_values(db, biz_id).await?;
        self.fill(&key, &values).await;
        Ok(values)
    }

    pub async fn definition_map(
        &self,
        db: &impl ConnectionTrait,
        biz_id: i64,
    ) -> Result<HashMap<i64, AttributeDef>, ApsisError> {
        let key = keys::abac_definitions(biz_id);
        if let Some(defs) = self.cached::<Vec<AttributeDef>>(&key).await {
            return Ok(defs.into_iter().map(|d| (d.id, d)).collect());
        }
        let map = store::attributes::definition_map(db, biz_id).await?;
        let defs: Vec<&AttributeDef> = map.values().collect();
        self.fill(&key, &defs).await;
        Ok(map)
    }

    pub async fn invalidate_subject(&self, biz_id: i64, subject_id: i64) {
        let _ = self.kv.delete(&keys::abac_subject_attrs(biz_id, subject_id)).await;
    }

    pub async fn invalidate_resource(&self, biz_id: i64, resource_id: i64) {
        let _ = self.kv.delete(&keys::abac_resource_attrs(biz_id, resource_id)).await;
    }

    pub async fn invalidate_environment(&self, biz_id: i64) {
        let _ = self.kv.delete(&keys::abac_environment_attrs(biz_id)).await;
    }

    pub async fn invalidate_definitions(&self, biz_id: i64) {
        let _ = self.kv.delete(&keys::abac_definitions(biz_id)).await;
    }
}
