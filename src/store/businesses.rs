use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};

use super::{now_ms, DEFAULT_PAGE_SIZE};
use crate::entities;
use crate::errors::ApsisError;

pub async fn create_business(
    db: &impl ConnectionTrait,
    owner_id: i64,
    owner_type: &str,
    name: &str,
    rate_limit: i64,
) -> Result<entities::business::Model, ApsisError> {
    let now = now_ms();
    let business = entities::business::ActiveModel {
        owner_id: Set(owner_id),
        owner_type: Set(owner_type.to_string()),
        name: Set(name.to_string()),
        rate_limit: Set(rate_limit),
        token: Set(String::new()),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    business
        .insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "business"))
}

pub async fn get_business(
    db: &impl ConnectionTrait,
    id: i64,
) -> Result<Option<entities::business::Model>, ApsisError> {
    Ok(entities::Business::find_by_id(id).one(db).await?)
}

pub async fn list_businesses(
    db: &impl ConnectionTrait,
    page: u64,
) -> Result<Vec<entities::business::Model>, ApsisError> {
    use entities::business::{Column, Entity};
    Ok(Entity::find()
        .order_by_asc(Column::Id)
        .offset(page * DEFAULT_PAGE_SIZE)
        .limit(DEFAULT_PAGE_SIZE)
        .all(db)
        .await?)
}

pub async fn list_business_ids(db: &impl ConnectionTrait) -> Result<Vec<i64>, ApsisError> {
    Ok(entities::Business::find()
        .all(db)
        .await?
        .into_iter()
        .map(|b| b.id)
        .collect())
}

pub async fn update_business_token(
    db: &impl ConnectionTrait,
    id: i64,
    token: &str,
) -> Result<(), ApsisError> {
    let business = entities::Business::find_by_id(id)
        .one(db)
        .await?
        .ok_or(ApsisError::BizNotFound(id))?;
    let mut active: entities::business::ActiveModel = business.into();
    active.token = Set(token.to_string());
    active.utime = Set(now_ms());
    active.update(db).await?;
    Ok(())
}

/// Deleting a business cascades to everything it owns.
pub async fn delete_business(db: &(impl ConnectionTrait + TransactionTrait), id: i64) -> Result<(), ApsisError> {
    let txn = db.begin().await?;

    entities::PermissionPolicy::delete_many()
        .filter(entities::permission_policy::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::PolicyRule::delete_many()
        .filter(entities::policy_rule::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::Policy::delete_many()
        .filter(entities::policy::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::EnvironmentAttributeValue::delete_many()
        .filter(entities::environment_attribute_value::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::ResourceAttributeValue::delete_many()
        .filter(entities::resource_attribute_value::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::SubjectAttributeValue::delete_many()
        .filter(entities::subject_attribute_value::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::AttributeDefinition::delete_many()
        .filter(entities::attribute_definition::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::UserPermission::delete_many()
        .filter(entities::user_permission::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::UserRole::delete_many()
        .filter(entities::user_role::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::RolePermission::delete_many()
        .filter(entities::role_permission::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::RoleInclusion::delete_many()
        .filter(entities::role_inclusion::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::Role::delete_many()
        .filter(entities::role::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::Permission::delete_many()
        .filter(entities::permission::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::Resource::delete_many()
        .filter(entities::resource::Column::BizId.eq(id))
        .exec(&txn)
        .await?;
    entities::Business::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;
    Ok(())
}
