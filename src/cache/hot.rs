//! Local policy cache warmed by the hot-key coordinator topic.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::keys;
use super::kv::KvStore;
use crate::entities;
use crate::errors::ApsisError;
use crate::store;

/// A business's policies with their flat rule rows, as warmed in bulk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyBundle {
    pub policies: Vec<entities::policy::Model>,
    pub rules: HashMap<i64, Vec<entities::policy_rule::Model>>,
}

pub struct PolicyHotCache {
    kv: Arc<dyn KvStore>,
    bundles: RwLock<HashMap<i64, Arc<PolicyBundle>>>,
}

impl PolicyHotCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            bundles: RwLock::new(HashMap::new()),
        }
    }

    /// Loads the biz's policy set from the store and installs it in the
    /// in-process map and under the shared `abac:policy:<biz>` key.
    pub async fn warm(&self, db: &impl ConnectionTrait, biz_id: i64) -> Result<(), ApsisError> {
        let policies = store::policies::all_policies(db, biz_id).await?;
        let policy_ids: Vec<i64> = policies.iter().map(|p| p.id).collect();
        let rules = store::policies::find_policy_rules_by_policy_ids(db, &policy_ids).await?;
        let bundle = Arc::new(PolicyBundle { policies, rules });

        if let Ok(json) = serde_json::to_string(bundle.as_ref()) {
            if let Err(err) = self.kv.set(&keys::abac_policies(biz_id), &json).await {
                debug!(biz_id, %err, "policy bundle cache write failed");
            }
        }
        self.bundles.write().await.insert(biz_id, bundle);
        debug!(biz_id, "policy hot cache warmed");
        Ok(())
    }

    pub async fn get(&self, biz_id: i64) -> Option<Arc<PolicyBundle>> {
        self.bundles.read().await.get(&biz_id).cloned()
    }

    pub async fn invalidate(&self, biz_id: i64) {
        self.bundles.write().await.remove(&biz_id);
        let _ = self.kv.delete(&keys::abac_policies(biz_id)).await;
    }
}
