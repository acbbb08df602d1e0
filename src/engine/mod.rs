//! The permission decision engine.
//!
//! `rbac` resolves a user's effective permissions over the role-inclusion
//! graph and per-user overlays; `abac` evaluates attribute policies over
//! typed rule trees (`ruletree` + `evaluators`); `check` unifies the two
//! under deny-overrides.

pub mod abac;
pub mod evaluators;
pub mod rbac;
pub mod ruletree;
pub mod types;

use std::collections::HashMap;

use sea_orm::ConnectionTrait;

use crate::cache::abac::AbacCache;
use crate::cache::session::SessionPermissionCache;
use crate::errors::ApsisError;
use crate::store;
use types::Effect;

/// One permission-check request as received from the wire.
#[derive(Debug, Clone)]
pub struct CheckInput {
    pub biz_id: i64,
    pub user_id: i64,
    pub resource_type: String,
    pub resource_key: String,
    pub actions: Vec<String>,
    /// Caller-supplied attribute overrides, keyed by attribute name.
    pub overrides: HashMap<String, String>,
}

/// Unified RBAC + ABAC decision.
///
/// Candidate permissions are looked up for (resource, actions). A resource
/// with no registered permissions is unmanaged and allowed. Otherwise votes
/// are collected from the user's cached snapshot (role-derived permissions
/// merged with overlays) and from every matching active policy; any deny
/// vote denies, and every requested action needs an allow vote to pass.
pub async fn check(
    db: &impl ConnectionTrait,
    sessions: &SessionPermissionCache,
    abac_cache: &AbacCache,
    input: &CheckInput,
    now_ms: i64,
) -> Result<bool, ApsisError> {
    let candidates = store::permissions::find_permissions(
        db,
        input.biz_id,
        &input.resource_type,
        &input.resource_key,
        &input.actions,
    )
    .await?;
    if candidates.is_empty() {
        return Ok(true);
    }

    let snapshot = sessions.get_or_resolve(db, input.biz_id, input.user_id, now_ms).await?;

    let mut votes: Vec<(String, Effect)> = Vec::new();
    for entry in &snapshot.permissions {
        if entry.resource.resource_type == input.resource_type
            && entry.resource.key == input.resource_key
            && input.actions.iter().any(|a| *a == entry.action)
        {
            votes.push((entry.action.clone(), entry.effect));
        }
    }

    votes.extend(abac::evaluate_policies(db, abac_cache, input, &candidates).await?);

    if votes.iter().any(|(_, effect)| *effect == Effect::Deny) {
        return Ok(false);
    }
    let all_allowed = input
        .actions
        .iter()
        .all(|action| votes.iter().any(|(a, e)| a == action && *e == Effect::Allow));
    Ok(all_allowed)
}
