use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use super::{now_ms, DEFAULT_PAGE_SIZE};
use crate::entities;
use crate::errors::ApsisError;

/// Creates a permission on a resource. The resource's type/key are
/// denormalized onto the row so checks need no join.
pub async fn create_permission(
    db: &impl ConnectionTrait,
    biz_id: i64,
    name: &str,
    description: &str,
    resource: &entities::resource::Model,
    action: &str,
    metadata: &str,
) -> Result<entities::permission::Model, ApsisError> {
    let now = now_ms();
    let permission = entities::permission::ActiveModel {
        biz_id: Set(biz_id),
        name: Set(name.to_string()),
        description: Set(description.to_string()),
        resource_id: Set(resource.id),
        resource_type: Set(resource.resource_type.clone()),
        resource_key: Set(resource.resource_key.clone()),
        action: Set(action.to_string()),
        metadata: Set(metadata.to_string()),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    permission
        .insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "permission"))
}

/// Candidate permissions for a check: all rows matching the resource
/// coordinates with any of the requested actions.
pub async fn find_permissions(
    db: &impl ConnectionTrait,
    biz_id: i64,
    resource_type: &str,
    resource_key: &str,
    actions: &[String],
) -> Result<Vec<entities::permission::Model>, ApsisError> {
    use entities::permission::{Column, Entity};
    if actions.is_empty() {
        return Ok(Vec::new());
    }
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::ResourceType.eq(resource_type))
        .filter(Column::ResourceKey.eq(resource_key))
        .filter(Column::Action.is_in(actions.iter().cloned()))
        .all(db)
        .await?)
}

pub async fn get_permission(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
) -> Result<Option<entities::permission::Model>, ApsisError> {
    use entities::permission::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .one(db)
        .await?)
}

pub async fn get_permissions_by_ids(
    db: &impl ConnectionTrait,
    biz_id: i64,
    ids: &[i64],
) -> Result<Vec<entities::permission::Model>, ApsisError> {
    use entities::permission::{Column, Entity};
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.is_in(ids.iter().copied()))
        .all(db)
        .await?)
}

pub async fn list_permissions(
    db: &impl ConnectionTrait,
    biz_id: i64,
    page: u64,
) -> Result<Vec<entities::permission::Model>, ApsisError> {
    use entities::permission::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .order_by_asc(Column::Id)
        .offset(page * DEFAULT_PAGE_SIZE)
        .limit(DEFAULT_PAGE_SIZE)
        .all(db)
        .await?)
}

pub async fn update_permission(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
    name: Option<String>,
    description: Option<String>,
    metadata: Option<String>,
) -> Result<(), ApsisError> {
    let permission = get_permission(db, biz_id, id)
        .await?
        .ok_or_else(|| ApsisError::UpdateFailed(format!("permission {id}")))?;
    let mut active: entities::permission::ActiveModel = permission.into();
    if let Some(name) = name {
        active.name = Set(name);
    }
    if let Some(description) = description {
        active.description = Set(description);
    }
    if let Some(metadata) = metadata {
        active.metadata = Set(metadata);
    }
    active.utime = Set(now_ms());
    active.update(db).await?;
    Ok(())
}

pub async fn delete_permission(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
) -> Result<(), ApsisError> {
    use entities::permission::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}
