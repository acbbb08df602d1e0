//! JSON event payloads carried on the topics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::types::{Effect, EffectivePermission};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub key: String,
    #[serde(rename = "type")]
    pub resource_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub resource: ResourceRef,
    pub action: String,
    pub effect: Effect,
}

/// One user's effective permissions at production time: the snapshot shape
/// shared with the SDK caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermissionSnapshot {
    pub user_id: i64,
    pub biz_id: i64,
    pub permissions: Vec<PermissionEntry>,
}

impl UserPermissionSnapshot {
    pub fn from_effective(biz_id: i64, user_id: i64, effective: &[EffectivePermission]) -> Self {
        Self {
            user_id,
            biz_id,
            permissions: effective
                .iter()
                .map(|p| PermissionEntry {
                    resource: ResourceRef {
                        key: p.resource_key.clone(),
                        resource_type: p.resource_type.clone(),
                    },
                    action: p.action.clone(),
                    effect: p.effect,
                })
                .collect(),
        }
    }
}

/// Published after a reload; each snapshot is the authoritative latest for
/// its user, so late duplicates idempotently re-install the same state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissionEvent {
    /// Keyed by decimal user id.
    pub permissions: HashMap<String, UserPermissionSnapshot>,
}

/// A diverted write awaiting replay against the recovered database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbFailoverEvent {
    pub sql: String,
    pub args: Vec<serde_json::Value>,
}

/// Businesses whose policies should be warmed into the local policy cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyHotKeyEvent {
    pub biz_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_wire_shape() {
        let snapshot = UserPermissionSnapshot {
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
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["userId"], 1001);
        assert_eq!(json["bizId"], 10);
        assert_eq!(json["permissions"][0]["resource"]["type"], "doc");
        assert_eq!(json["permissions"][0]["resource"]["key"], "/a");
        assert_eq!(json["permissions"][0]["effect"], "allow");
    }

    #[test]
    fn event_roundtrip() {
        let mut permissions = HashMap::new();
        permissions.insert(
            "1001".to_string(),
            UserPermissionSnapshot {
                user_id: 1001,
                biz_id: 10,
                permissions: vec![],
            },
        );
        let event = UserPermissionEvent { permissions };
        let raw = serde_json::to_vec(&event).unwrap();
        let parsed: UserPermissionEvent = serde_json::from_slice(&raw).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn failover_event_preserves_args() {
        let event = DbFailoverEvent {
            sql: "UPDATE roles SET name = ? WHERE id = ?".into(),
            args: vec![serde_json::json!("admin"), serde_json::json!(5)],
        };
        let raw = serde_json::to_string(&event).unwrap();
        let parsed: DbFailoverEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, event);
    }
}
