use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use super::{now_ms, DEFAULT_PAGE_SIZE};
use crate::entities;
use crate::errors::ApsisError;

#[allow(clippy::too_many_arguments)]
pub async fn create_resource(
    db: &impl ConnectionTrait,
    biz_id: i64,
    resource_type: &str,
    resource_key: &str,
    name: &str,
    description: &str,
    metadata: &str,
) -> Result<entities::resource::Model, ApsisError> {
    let now = now_ms();
    let resource = entities::resource::ActiveModel {
        biz_id: Set(biz_id),
        resource_type: Set(resource_type.to_string()),
        resource_key: Set(resource_key.to_string()),
        name: Set(name.to_string()),
        description: Set(description.to_string()),
        metadata: Set(metadata.to_string()),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    resource
        .insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "resource"))
}

pub async fn get_resource(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
) -> Result<Option<entities::resource::Model>, ApsisError> {
    use entities::resource::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .one(db)
        .await?)
}

/// Resolves a resource from its business-unique (type, key) pair.
pub async fn find_resource(
    db: &impl ConnectionTrait,
    biz_id: i64,
    resource_type: &str,
    resource_key: &str,
) -> Result<Option<entities::resource::Model>, ApsisError> {
    use entities::resource::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::ResourceType.eq(resource_type))
        .filter(Column::ResourceKey.eq(resource_key))
        .one(db)
        .await?)
}

pub async fn list_resources(
    db: &impl ConnectionTrait,
    biz_id: i64,
    page: u64,
) -> Result<Vec<entities::resource::Model>, ApsisError> {
    use entities::resource::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .order_by_asc(Column::Id)
        .offset(page * DEFAULT_PAGE_SIZE)
        .limit(DEFAULT_PAGE_SIZE)
        .all(db)
        .await?)
}

pub async fn update_resource(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
    name: Option<String>,
    description: Option<String>,
    metadata: Option<String>,
) -> Result<(), ApsisError> {
    let resource = get_resource(db, biz_id, id)
        .await?
        .ok_or_else(|| ApsisError::UpdateFailed(format!("resource {id}")))?;
    let mut active: entities::resource::ActiveModel = resource.into();
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

pub async fn delete_resource(db: &impl ConnectionTrait, biz_id: i64, id: i64) -> Result<(), ApsisError> {
    use entities::resource::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}
