use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};

use super::{now_ms, DEFAULT_PAGE_SIZE};
use crate::entities;
use crate::errors::ApsisError;

/// A policy together with its rules and the permission-policy edge that
/// pulled it into a check.
#[derive(Debug, Clone)]
pub struct PolicyBinding {
    pub policy: entities::policy::Model,
    pub rules: Vec<entities::policy_rule::Model>,
    pub permission_id: i64,
    /// The edge's vote when the policy matches: "allow" | "deny".
    pub effect: String,
}

pub async fn create_policy(
    db: &impl ConnectionTrait,
    biz_id: i64,
    name: &str,
    description: &str,
    status: &str,
    execute_type: &str,
) -> Result<entities::policy::Model, ApsisError> {
    let now = now_ms();
    let policy = entities::policy::ActiveModel {
        biz_id: Set(biz_id),
        name: Set(name.to_string()),
        description: Set(description.to_string()),
        status: Set(status.to_string()),
        execute_type: Set(execute_type.to_string()),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    policy
        .insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "policy"))
}

pub async fn get_policy(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
) -> Result<Option<entities::policy::Model>, ApsisError> {
    use entities::policy::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .one(db)
        .await?)
}

pub async fn list_policies(
    db: &impl ConnectionTrait,
    biz_id: i64,
    page: u64,
) -> Result<Vec<entities::policy::Model>, ApsisError> {
    use entities::policy::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .order_by_asc(Column::Id)
        .offset(page * DEFAULT_PAGE_SIZE)
        .limit(DEFAULT_PAGE_SIZE)
        .all(db)
        .await?)
}

/// The full policy set of a business, for bulk warming.
pub async fn all_policies(
    db: &impl ConnectionTrait,
    biz_id: i64,
) -> Result<Vec<entities::policy::Model>, ApsisError> {
    use entities::policy::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .order_by_asc(Column::Id)
        .all(db)
        .await?)
}

pub async fn update_policy_status(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
    status: &str,
) -> Result<(), ApsisError> {
    let policy = get_policy(db, biz_id, id)
        .await?
        .ok_or_else(|| ApsisError::UpdateFailed(format!("policy {id}")))?;
    let mut active: entities::policy::ActiveModel = policy.into();
    active.status = Set(status.to_string());
    active.utime = Set(now_ms());
    active.update(db).await?;
    Ok(())
}

/// Inserts one rule row. The parent references it by left_id/right_id;
/// the tree shape is recovered at load time.
#[allow(clippy::too_many_arguments)]
pub async fn save_rule(
    db: &impl ConnectionTrait,
    biz_id: i64,
    policy_id: i64,
    attr_def_id: i64,
    value: &str,
    operator: &str,
    left_id: i64,
    right_id: i64,
) -> Result<entities::policy_rule::Model, ApsisError> {
    let now = now_ms();
    let rule = entities::policy_rule::ActiveModel {
        biz_id: Set(biz_id),
        policy_id: Set(policy_id),
        attr_def_id: Set(attr_def_id),
        value: Set(value.to_string()),
        operator: Set(operator.to_string()),
        left_id: Set(left_id),
        right_id: Set(right_id),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    rule.insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "policy rule"))
}

pub async fn delete_rule(db: &impl ConnectionTrait, biz_id: i64, id: i64) -> Result<(), ApsisError> {
    use entities::policy_rule::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

/// The flat rule rows of each requested policy, keyed by policy id.
pub async fn find_policy_rules_by_policy_ids(
    db: &impl ConnectionTrait,
    policy_ids: &[i64],
) -> Result<HashMap<i64, Vec<entities::policy_rule::Model>>, ApsisError> {
    use entities::policy_rule::{Column, Entity};
    if policy_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = Entity::find()
        .filter(Column::PolicyId.is_in(policy_ids.iter().copied()))
        .all(db)
        .await?;
    let mut map: HashMap<i64, Vec<entities::policy_rule::Model>> = HashMap::new();
    for row in rows {
        map.entry(row.policy_id).or_default().push(row);
    }
    Ok(map)
}

pub async fn attach_policy(
    db: &impl ConnectionTrait,
    biz_id: i64,
    permission_id: i64,
    policy_id: i64,
    effect: &str,
) -> Result<entities::permission_policy::Model, ApsisError> {
    let now = now_ms();
    let edge = entities::permission_policy::ActiveModel {
        biz_id: Set(biz_id),
        permission_id: Set(permission_id),
        policy_id: Set(policy_id),
        effect: Set(effect.to_string()),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    edge.insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "permission policy"))
}

pub async fn detach_policy(
    db: &impl ConnectionTrait,
    biz_id: i64,
    permission_id: i64,
    policy_id: i64,
) -> Result<(), ApsisError> {
    use entities::permission_policy::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::PermissionId.eq(permission_id))
        .filter(Column::PolicyId.eq(policy_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Every policy attached to any of the given permissions, with its rules
/// and the attaching edge.
pub async fn find_policies_by_permission_ids(
    db: &impl ConnectionTrait,
    biz_id: i64,
    permission_ids: &[i64],
) -> Result<Vec<PolicyBinding>, ApsisError> {
    use entities::permission_policy::{Column as EdgeColumn, Entity as EdgeEntity};
    use entities::policy::{Column as PolicyColumn, Entity as PolicyEntity};

    if permission_ids.is_empty() {
        return Ok(Vec::new());
    }
    let edges = EdgeEntity::find()
        .filter(EdgeColumn::BizId.eq(biz_id))
        .filter(EdgeColumn::PermissionId.is_in(permission_ids.iter().copied()))
        .all(db)
        .await?;
    if edges.is_empty() {
        return Ok(Vec::new());
    }

    let policy_ids: Vec<i64> = edges.iter().map(|e| e.policy_id).collect();
    let policies = PolicyEntity::find()
        .filter(PolicyColumn::BizId.eq(biz_id))
        .filter(PolicyColumn::Id.is_in(policy_ids.iter().copied()))
        .all(db)
        .await?;
    let by_id: HashMap<i64, entities::policy::Model> =
        policies.into_iter().map(|p| (p.id, p)).collect();
    let mut rules = find_policy_rules_by_policy_ids(db, &policy_ids).await?;

    let mut bindings = Vec::with_capacity(edges.len());
    for edge in edges {
        let Some(policy) = by_id.get(&edge.policy_id) else {
            // Dangling edge; the policy was deleted out from under it.
            continue;
        };
        bindings.push(PolicyBinding {
            policy: policy.clone(),
            rules: rules.remove(&edge.policy_id).unwrap_or_default(),
            permission_id: edge.permission_id,
            effect: edge.effect,
        });
    }
    Ok(bindings)
}

/// Cascading delete of a policy: edges, then rules, then the policy row,
/// in one transaction.
pub async fn delete_policy(db: &(impl ConnectionTrait + TransactionTrait), biz_id: i64, id: i64) -> Result<(), ApsisError> {
    let txn = db.begin().await?;

    entities::PermissionPolicy::delete_many()
        .filter(entities::permission_policy::Column::BizId.eq(biz_id))
        .filter(entities::permission_policy::Column::PolicyId.eq(id))
        .exec(&txn)
        .await?;
    entities::PolicyRule::delete_many()
        .filter(entities::policy_rule::Column::BizId.eq(biz_id))
        .filter(entities::policy_rule::Column::PolicyId.eq(id))
        .exec(&txn)
        .await?;
    entities::Policy::delete_many()
        .filter(entities::policy::Column::BizId.eq(biz_id))
        .filter(entities::policy::Column::Id.eq(id))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    Ok(())
}
