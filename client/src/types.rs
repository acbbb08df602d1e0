//! Wire contracts shared with the permission service, and the snapshot
//! scan every caching layer uses.

use std::collections::HashMap;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

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

/// A user's effective-permission snapshot as cached and carried in change
/// events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermission {
    pub user_id: i64,
    pub biz_id: i64,
    pub permissions: Vec<PermissionEntry>,
}

/// Change event: the authoritative latest snapshot per user at production
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissionEvent {
    pub permissions: HashMap<String, UserPermission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckPermissionRequest {
    pub uid: i64,
    pub permission: PermissionQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionQuery {
    pub biz_id: i64,
    pub resource_type: String,
    pub resource_key: String,
    pub actions: Vec<String>,
}

impl CheckPermissionRequest {
    pub fn new(
        uid: i64,
        biz_id: i64,
        resource_type: impl Into<String>,
        resource_key: impl Into<String>,
        actions: Vec<String>,
    ) -> Self {
        Self {
            uid,
            permission: PermissionQuery {
                biz_id,
                resource_type: resource_type.into(),
                resource_key: resource_key.into(),
                actions,
            },
        }
    }
}

/// Answers a check from a snapshot.
///
/// Scans entries matching the request's biz, resource type and key whose
/// action was requested: any deny answers false; every requested action
/// covered by an allow answers true; anything else is
/// [`ClientError::UnknownPermissionAction`], the cache-incomplete signal
/// that sends the caller to the base client.
pub fn check_permission(
    snapshot: &UserPermission,
    request: &CheckPermissionRequest,
) -> Result<bool, ClientError> {
    if snapshot.biz_id != request.permission.biz_id {
        return Err(ClientError::UnknownPermissionAction);
    }
    let mut allowed_actions: HashSet<&str> = HashSet::new();
    for entry in &snapshot.permissions {
        if entry.resource.resource_type != request.permission.resource_type
            || entry.resource.key != request.permission.resource_key
        {
            continue;
        }
        if !request.permission.actions.iter().any(|a| *a == entry.action) {
            continue;
        }
        match entry.effect {
            Effect::Deny => return Ok(false),
            Effect::Allow => {
                allowed_actions.insert(entry.action.as_str());
            }
        }
    }
    if request
        .permission
        .actions
        .iter()
        .all(|a| allowed_actions.contains(a.as_str()))
    {
        Ok(true)
    } else {
        Err(ClientError::UnknownPermissionAction)
    }
}

/// `client:userpermissions:bizId:<b>:userId:<u>`; shared with every sibling
/// process, so the format is contract-stable.
pub fn user_permissions_key(biz_id: i64, user_id: i64) -> String {
    format!("client:userpermissions:bizId:{biz_id}:userId:{user_id}")
}

/// Reverses [`user_permissions_key`] by strict split.
pub fn parse_user_permissions_key(key: &str) -> Result<(i64, i64), ClientError> {
    let parts: Vec<&str> = key.split(':').collect();
    match parts.as_slice() {
        ["client", "userpermissions", "bizId", biz, "userId", user] => {
            let biz_id = biz
                .parse()
                .map_err(|_| ClientError::MalformedKey(key.to_string()))?;
            let user_id = user
                .parse()
                .map_err(|_| ClientError::MalformedKey(key.to_string()))?;
            Ok((biz_id, user_id))
        }
        _ => Err(ClientError::MalformedKey(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: Vec<(&str, &str, &str, Effect)>) -> UserPermission {
        UserPermission {
            user_id: 1001,
            biz_id: 10,
            permissions: entries
                .into_iter()
                .map(|(rtype, key, action, effect)| PermissionEntry {
                    resource: ResourceRef {
                        key: key.to_string(),
                        resource_type: rtype.to_string(),
                    },
                    action: action.to_string(),
                    effect,
                })
                .collect(),
        }
    }

    fn request(actions: &[&str]) -> CheckPermissionRequest {
        CheckPermissionRequest::new(
            1001,
            10,
            "doc",
            "/a",
            actions.iter().map(|a| a.to_string()).collect(),
        )
    }

    #[test]
    fn allow_when_every_action_covered() {
        let snap = snapshot(vec![("doc", "/a", "read", Effect::Allow)]);
        assert!(check_permission(&snap, &request(&["read"])).unwrap());
    }

    #[test]
    fn deny_short_circuits() {
        let snap = snapshot(vec![
            ("doc", "/a", "read", Effect::Allow),
            ("doc", "/a", "read", Effect::Deny),
        ]);
        assert!(!check_permission(&snap, &request(&["read"])).unwrap());
    }

    #[test]
    fn incomplete_snapshot_is_unknown() {
        let snap = snapshot(vec![("doc", "/a", "read", Effect::Allow)]);
        let err = check_permission(&snap, &request(&["read", "update"])).unwrap_err();
        assert!(err.is_unknown_permission_action());
    }

    #[test]
    fn other_resources_do_not_count() {
        let snap = snapshot(vec![("doc", "/other", "read", Effect::Allow)]);
        let err = check_permission(&snap, &request(&["read"])).unwrap_err();
        assert!(err.is_unknown_permission_action());
    }

    #[test]
    fn key_roundtrip() {
        let key = user_permissions_key(10, 1001);
        assert_eq!(key, "client:userpermissions:bizId:10:userId:1001");
        assert_eq!(parse_user_permissions_key(&key).unwrap(), (10, 1001));
    }

    #[test]
    fn malformed_keys_error() {
        assert!(parse_user_permissions_key("client:userpermissions:10:1001").is_err());
        assert!(parse_user_permissions_key("client:userpermissions:bizId:x:userId:1").is_err());
        assert!(parse_user_permissions_key("").is_err());
    }

    #[test]
    fn snapshot_json_shape() {
        let snap = snapshot(vec![("doc", "/a", "read", Effect::Allow)]);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["userId"], 1001);
        assert_eq!(json["permissions"][0]["resource"]["type"], "doc");
        assert_eq!(json["permissions"][0]["effect"], "allow");
    }
}
