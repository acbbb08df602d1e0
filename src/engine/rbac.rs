//! RBAC resolution: a user's effective permissions at an instant.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use sea_orm::ConnectionTrait;

use super::types::{Effect, EffectivePermission};
use crate::errors::ApsisError;
use crate::store;

/// Computes the effective `{permission, effect}` set for (biz, user):
/// valid direct roles, closed transitively over role inclusions, their
/// permissions projected to allow, then the user's valid overlays merged
/// on top with deny overriding allow.
pub async fn resolve_user_permissions(
    db: &impl ConnectionTrait,
    biz_id: i64,
    user_id: i64,
    now_ms: i64,
) -> Result<Vec<EffectivePermission>, ApsisError> {
    let direct = store::users::user_roles_valid(db, biz_id, user_id, now_ms).await?;
    let role_ids: Vec<i64> = direct.iter().map(|r| r.role_id).collect();
    let closed = close_roles(db, biz_id, &role_ids).await?;

    let role_perms = store::roles::role_permissions(db, biz_id, &closed).await?;
    let mut merged: HashMap<i64, EffectivePermission> = HashMap::new();
    for edge in role_perms {
        merged
            .entry(edge.permission_id)
            .or_insert_with(|| EffectivePermission {
                permission_id: edge.permission_id,
                resource_type: edge.resource_type.clone(),
                resource_key: edge.resource_key.clone(),
                action: edge.permission_action.clone(),
                effect: Effect::Allow,
            });
    }

    let overlays = store::users::user_permissions_valid(db, biz_id, user_id, now_ms).await?;
    if !overlays.is_empty() {
        // Overlay rows carry only permission ids; pull coordinates for the
        // ones the role projection did not already supply.
        let missing: Vec<i64> = overlays
            .iter()
            .map(|o| o.permission_id)
            .filter(|id| !merged.contains_key(id))
            .collect();
        let details = store::permissions::get_permissions_by_ids(db, biz_id, &missing).await?;
        let details: HashMap<i64, _> = details.into_iter().map(|p| (p.id, p)).collect();

        for overlay in overlays {
            let effect = Effect::from_str(&overlay.effect)?;
            match merged.get_mut(&overlay.permission_id) {
                Some(entry) => {
                    // Deny always wins over allow.
                    if effect == Effect::Deny {
                        entry.effect = Effect::Deny;
                    }
                }
                None => {
                    let Some(perm) = details.get(&overlay.permission_id) else {
                        // Overlay pointing at a deleted permission; skip it.
                        continue;
                    };
                    merged.insert(
                        overlay.permission_id,
                        EffectivePermission {
                            permission_id: perm.id,
                            resource_type: perm.resource_type.clone(),
                            resource_key: perm.resource_key.clone(),
                            action: perm.action.clone(),
                            effect,
                        },
                    );
                }
            }
        }
    }

    let mut out: Vec<EffectivePermission> = merged.into_values().collect();
    out.sort_by_key(|p| p.permission_id);
    Ok(out)
}

/// Transitive closure of the role set over inclusion edges
/// (including -> included), breadth-first and cycle-safe.
pub async fn close_roles(
    db: &impl ConnectionTrait,
    biz_id: i64,
    role_ids: &[i64],
) -> Result<Vec<i64>, ApsisError> {
    let mut visited: BTreeSet<i64> = role_ids.iter().copied().collect();
    let mut frontier: Vec<i64> = role_ids.to_vec();
    while !frontier.is_empty() {
        let edges = store::roles::inclusions_of(db, biz_id, &frontier).await?;
        frontier = edges
            .into_iter()
            .map(|e| e.included_role_id)
            .filter(|id| visited.insert(*id))
            .collect();
    }
    Ok(visited.into_iter().collect())
}

/// Reverse closure: every role whose transitive closure contains one of
/// `role_ids`. Used to find the users affected by an inclusion or
/// role-permission change.
pub async fn roles_including(
    db: &impl ConnectionTrait,
    biz_id: i64,
    role_ids: &[i64],
) -> Result<Vec<i64>, ApsisError> {
    let mut visited: BTreeSet<i64> = role_ids.iter().copied().collect();
    let mut frontier: Vec<i64> = role_ids.to_vec();
    while !frontier.is_empty() {
        let edges = store::roles::inclusions_into(db, biz_id, &frontier).await?;
        frontier = edges
            .into_iter()
            .map(|e| e.including_role_id)
            .filter(|id| visited.insert(*id))
            .collect();
    }
    Ok(visited.into_iter().collect())
}

/// Users whose effective permissions may change when `role_id` (or its
/// permission set) changes: holders of any role that transitively
/// includes it.
pub async fn affected_users(
    db: &impl ConnectionTrait,
    biz_id: i64,
    role_id: i64,
) -> Result<Vec<i64>, ApsisError> {
    let including = roles_including(db, biz_id, &[role_id]).await?;
    store::users::users_with_roles(db, biz_id, &including).await
}
