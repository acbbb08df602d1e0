use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use super::{now_ms, DEFAULT_PAGE_SIZE};
use crate::entities;
use crate::errors::ApsisError;

#[allow(clippy::too_many_arguments)]
pub async fn create_role(
    db: &impl ConnectionTrait,
    biz_id: i64,
    role_type: &str,
    name: &str,
    description: &str,
    metadata: &str,
    start_time: i64,
    end_time: i64,
) -> Result<entities::role::Model, ApsisError> {
    let now = now_ms();
    let role = entities::role::ActiveModel {
        biz_id: Set(biz_id),
        role_type: Set(role_type.to_string()),
        name: Set(name.to_string()),
        description: Set(description.to_string()),
        metadata: Set(metadata.to_string()),
        start_time: Set(start_time),
        end_time: Set(end_time),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    role.insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "role"))
}

pub async fn get_role(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
) -> Result<Option<entities::role::Model>, ApsisError> {
    use entities::role::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .one(db)
        .await?)
}

pub async fn list_roles(
    db: &impl ConnectionTrait,
    biz_id: i64,
    page: u64,
) -> Result<Vec<entities::role::Model>, ApsisError> {
    use entities::role::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .order_by_asc(Column::Id)
        .offset(page * DEFAULT_PAGE_SIZE)
        .limit(DEFAULT_PAGE_SIZE)
        .all(db)
        .await?)
}

pub async fn update_role(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
    name: Option<String>,
    description: Option<String>,
    metadata: Option<String>,
) -> Result<(), ApsisError> {
    let role = get_role(db, biz_id, id)
        .await?
        .ok_or_else(|| ApsisError::UpdateFailed(format!("role {id}")))?;
    let mut active: entities::role::ActiveModel = role.into();
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

pub async fn delete_role(db: &impl ConnectionTrait, biz_id: i64, id: i64) -> Result<(), ApsisError> {
    use entities::role::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

// ---------- role inclusions ----------

pub async fn add_inclusion(
    db: &impl ConnectionTrait,
    biz_id: i64,
    including_role_id: i64,
    included_role_id: i64,
) -> Result<entities::role_inclusion::Model, ApsisError> {
    let now = now_ms();
    let edge = entities::role_inclusion::ActiveModel {
        biz_id: Set(biz_id),
        including_role_id: Set(including_role_id),
        included_role_id: Set(included_role_id),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    edge.insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "role inclusion"))
}

pub async fn remove_inclusion(
    db: &impl ConnectionTrait,
    biz_id: i64,
    including_role_id: i64,
    included_role_id: i64,
) -> Result<(), ApsisError> {
    use entities::role_inclusion::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::IncludingRoleId.eq(including_role_id))
        .filter(Column::IncludedRoleId.eq(included_role_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Edges whose including side is in `including_ids` (forward expansion).
pub async fn inclusions_of(
    db: &impl ConnectionTrait,
    biz_id: i64,
    including_ids: &[i64],
) -> Result<Vec<entities::role_inclusion::Model>, ApsisError> {
    use entities::role_inclusion::{Column, Entity};
    if including_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::IncludingRoleId.is_in(including_ids.iter().copied()))
        .all(db)
        .await?)
}

/// Edges whose included side is in `included_ids` (reverse expansion, used
/// to find every role whose closure contains a touched role).
pub async fn inclusions_into(
    db: &impl ConnectionTrait,
    biz_id: i64,
    included_ids: &[i64],
) -> Result<Vec<entities::role_inclusion::Model>, ApsisError> {
    use entities::role_inclusion::{Column, Entity};
    if included_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::IncludedRoleId.is_in(included_ids.iter().copied()))
        .all(db)
        .await?)
}

// ---------- role permissions ----------

pub async fn add_role_permission(
    db: &impl ConnectionTrait,
    biz_id: i64,
    role_id: i64,
    permission: &entities::permission::Model,
) -> Result<entities::role_permission::Model, ApsisError> {
    let now = now_ms();
    let edge = entities::role_permission::ActiveModel {
        biz_id: Set(biz_id),
        role_id: Set(role_id),
        permission_id: Set(permission.id),
        resource_type: Set(permission.resource_type.clone()),
        resource_key: Set(permission.resource_key.clone()),
        permission_action: Set(permission.action.clone()),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    edge.insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "role permission"))
}

pub async fn remove_role_permission(
    db: &impl ConnectionTrait,
    biz_id: i64,
    role_id: i64,
    permission_id: i64,
) -> Result<(), ApsisError> {
    use entities::role_permission::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::RoleId.eq(role_id))
        .filter(Column::PermissionId.eq(permission_id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn role_permissions(
    db: &impl ConnectionTrait,
    biz_id: i64,
    role_ids: &[i64],
) -> Result<Vec<entities::role_permission::Model>, ApsisError> {
    use entities::role_permission::{Column, Entity};
    if role_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::RoleId.is_in(role_ids.iter().copied()))
        .all(db)
        .await?)
}
