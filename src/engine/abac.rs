//! ABAC decision engine: candidate policies over attribute bags.

use std::collections::HashMap;

use sea_orm::ConnectionTrait;
use std::str::FromStr;
use tracing::debug;

use super::ruletree::RuleTree;
use super::types::{AttributeBags, AttributeDef, Effect};
use super::CheckInput;
use crate::cache::abac::AbacCache;
use crate::entities;
use crate::errors::ApsisError;
use crate::store;
use crate::store::policies::PolicyBinding;

const STATUS_ACTIVE: &str = "active";

/// Evaluates every policy attached to the candidate permissions and
/// returns the votes of those that match, as (action, effect) pairs.
///
/// Attribute/policy/definition fetches run concurrently and any failure
/// aborts the check. Evaluator errors inside a policy make that policy
/// not vote; they never produce a blanket deny.
pub async fn evaluate_policies(
    db: &impl ConnectionTrait,
    abac_cache: &AbacCache,
    input: &CheckInput,
    candidates: &[entities::permission::Model],
) -> Result<Vec<(String, Effect)>, ApsisError> {
    let permission_ids: Vec<i64> = candidates.iter().map(|p| p.id).collect();
    let action_by_permission: HashMap<i64, &str> =
        candidates.iter().map(|p| (p.id, p.action.as_str())).collect();

    let resource =
        store::resources::find_resource(db, input.biz_id, &input.resource_type, &input.resource_key)
            .await?;
    let resource_id = resource.map(|r| r.id).unwrap_or(0);

    let (subject_values, resource_values, environment_values, bindings, defs) = tokio::try_join!(
        abac_cache.subject_values(db, input.biz_id, input.user_id),
        abac_cache.resource_values(db, input.biz_id, resource_id),
        abac_cache.environment_values(db, input.biz_id),
        store::policies::find_policies_by_permission_ids(db, input.biz_id, &permission_ids),
        abac_cache.definition_map(db, input.biz_id),
    )?;

    let mut bags = AttributeBags::default();
    for v in subject_values {
        bags.subject.insert(v.attr_def_id, v.value);
    }
    for v in resource_values {
        bags.resource.insert(v.attr_def_id, v.value);
    }
    for v in environment_values {
        bags.environment.insert(v.attr_def_id, v.value);
    }
    apply_overrides(&mut bags, &input.overrides, &defs);

    let mut votes = Vec::new();
    for binding in &bindings {
        if binding.policy.status != STATUS_ACTIVE {
            continue;
        }
        let Some(effect) = policy_matches(binding, &bags, &defs) else {
            continue;
        };
        let Some(action) = action_by_permission.get(&binding.permission_id) else {
            continue;
        };
        votes.push((action.to_string(), effect));
    }
    Ok(votes)
}

/// The ABAC engine's isolated decision for a check: open default when no
/// candidate policy exists, otherwise deny-overrides then any-allow.
pub async fn decide(
    db: &impl ConnectionTrait,
    abac_cache: &AbacCache,
    input: &CheckInput,
) -> Result<bool, ApsisError> {
    let candidates = store::permissions::find_permissions(
        db,
        input.biz_id,
        &input.resource_type,
        &input.resource_key,
        &input.actions,
    )
    .await?;
    let permission_ids: Vec<i64> = candidates.iter().map(|p| p.id).collect();
    let bindings =
        store::policies::find_policies_by_permission_ids(db, input.biz_id, &permission_ids).await?;
    if bindings.is_empty() {
        return Ok(true);
    }
    let votes = evaluate_policies(db, abac_cache, input, &candidates).await?;
    if votes.iter().any(|(_, e)| *e == Effect::Deny) {
        return Ok(false);
    }
    Ok(votes.iter().any(|(_, e)| *e == Effect::Allow))
}

/// Caller-supplied overrides are keyed by attribute name; the authoritative
/// definition decides which bag and id they land in.
fn apply_overrides(
    bags: &mut AttributeBags,
    overrides: &HashMap<String, String>,
    defs: &HashMap<i64, AttributeDef>,
) {
    if overrides.is_empty() {
        return;
    }
    let by_name: HashMap<&str, &AttributeDef> =
        defs.values().map(|d| (d.name.as_str(), d)).collect();
    for (name, value) in overrides {
        if let Some(def) = by_name.get(name.as_str()) {
            bags.insert(def.entity_type, def.id, value.clone());
        }
    }
}

/// Returns the binding's effect when its policy matches the bags, `None`
/// when it does not match or cannot be evaluated.
fn policy_matches(
    binding: &PolicyBinding,
    bags: &AttributeBags,
    defs: &HashMap<i64, AttributeDef>,
) -> Option<Effect> {
    let effect = Effect::from_str(&binding.effect).ok()?;
    let mut tree = match RuleTree::hydrate(&binding.rules) {
        Ok(tree) => tree,
        Err(err) => {
            debug!(policy = binding.policy.id, %err, "skipping unhydratable policy");
            return None;
        }
    };
    if let Err(err) = tree.decorate(defs) {
        debug!(policy = binding.policy.id, %err, "skipping undecoratable policy");
        return None;
    }
    // A policy with no rules matches unconditionally.
    tree.evaluate(bags).then_some(effect)
}
