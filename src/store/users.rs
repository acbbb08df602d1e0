use std::collections::BTreeSet;

use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use super::{now_ms, window_contains};
use crate::entities;
use crate::errors::ApsisError;

pub async fn grant_user_role(
    db: &impl ConnectionTrait,
    biz_id: i64,
    user_id: i64,
    role_id: i64,
    start_time: i64,
    end_time: i64,
) -> Result<entities::user_role::Model, ApsisError> {
    let now = now_ms();
    let edge = entities::user_role::ActiveModel {
        biz_id: Set(biz_id),
        user_id: Set(user_id),
        role_id: Set(role_id),
        start_time: Set(start_time),
        end_time: Set(end_time),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    edge.insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "user role"))
}

pub async fn revoke_user_role(
    db: &impl ConnectionTrait,
    biz_id: i64,
    user_id: i64,
    role_id: i64,
) -> Result<(), ApsisError> {
    use entities::user_role::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::UserId.eq(user_id))
        .filter(Column::RoleId.eq(role_id))
        .exec(db)
        .await?;
    Ok(())
}

/// The user's direct roles whose validity window contains `now`.
pub async fn user_roles_valid(
    db: &impl ConnectionTrait,
    biz_id: i64,
    user_id: i64,
    now: i64,
) -> Result<Vec<entities::user_role::Model>, ApsisError> {
    use entities::user_role::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::UserId.eq(user_id))
        .filter(window_contains(Column::StartTime, Column::EndTime, now))
        .all(db)
        .await?)
}

/// Distinct users holding any of the given roles (regardless of window;
/// reload re-resolves authoritatively anyway).
pub async fn users_with_roles(
    db: &impl ConnectionTrait,
    biz_id: i64,
    role_ids: &[i64],
) -> Result<Vec<i64>, ApsisError> {
    use entities::user_role::{Column, Entity};
    if role_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::RoleId.is_in(role_ids.iter().copied()))
        .all(db)
        .await?;
    let users: BTreeSet<i64> = rows.into_iter().map(|r| r.user_id).collect();
    Ok(users.into_iter().collect())
}

pub async fn grant_user_permission(
    db: &impl ConnectionTrait,
    biz_id: i64,
    user_id: i64,
    permission_id: i64,
    effect: &str,
    start_time: i64,
    end_time: i64,
) -> Result<entities::user_permission::Model, ApsisError> {
    let now = now_ms();
    let overlay = entities::user_permission::ActiveModel {
        biz_id: Set(biz_id),
        user_id: Set(user_id),
        permission_id: Set(permission_id),
        effect: Set(effect.to_string()),
        start_time: Set(start_time),
        end_time: Set(end_time),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    overlay
        .insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "user permission"))
}

pub async fn revoke_user_permission(
    db: &impl ConnectionTrait,
    biz_id: i64,
    user_id: i64,
    permission_id: i64,
) -> Result<(), ApsisError> {
    use entities::user_permission::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::UserId.eq(user_id))
        .filter(Column::PermissionId.eq(permission_id))
        .exec(db)
        .await?;
    Ok(())
}

/// The user's overlay records whose validity window contains `now`.
pub async fn user_permissions_valid(
    db: &impl ConnectionTrait,
    biz_id: i64,
    user_id: i64,
    now: i64,
) -> Result<Vec<entities::user_permission::Model>, ApsisError> {
    use entities::user_permission::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::UserId.eq(user_id))
        .filter(window_contains(Column::StartTime, Column::EndTime, now))
        .all(db)
        .await?)
}
