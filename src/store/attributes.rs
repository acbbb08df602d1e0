use std::collections::HashMap;
use std::str::FromStr;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use super::{now_ms, DEFAULT_PAGE_SIZE};
use crate::engine::types::{AttributeDef, DataType, EntityType};
use crate::entities;
use crate::errors::ApsisError;

#[allow(clippy::too_many_arguments)]
pub async fn create_definition(
    db: &impl ConnectionTrait,
    biz_id: i64,
    name: &str,
    description: &str,
    data_type: &str,
    entity_type: &str,
    validation_rule: &str,
) -> Result<entities::attribute_definition::Model, ApsisError> {
    // Reject unknown enums and broken regexes up front.
    DataType::from_str(data_type)?;
    EntityType::from_str(entity_type)?;
    if !validation_rule.is_empty() {
        regex::Regex::new(validation_rule)
            .map_err(|e| ApsisError::InvalidParameter(format!("validation_rule: {e}")))?;
    }

    let now = now_ms();
    let def = entities::attribute_definition::ActiveModel {
        biz_id: Set(biz_id),
        name: Set(name.to_string()),
        description: Set(description.to_string()),
        data_type: Set(data_type.to_string()),
        entity_type: Set(entity_type.to_string()),
        validation_rule: Set(validation_rule.to_string()),
        ctime: Set(now),
        utime: Set(now),
        ..Default::default()
    };
    def.insert(db)
        .await
        .map_err(|e| ApsisError::from_insert(e, "attribute definition"))
}

pub async fn get_definition(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
) -> Result<Option<entities::attribute_definition::Model>, ApsisError> {
    use entities::attribute_definition::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .one(db)
        .await?)
}

pub async fn list_definitions(
    db: &impl ConnectionTrait,
    biz_id: i64,
    page: u64,
) -> Result<Vec<entities::attribute_definition::Model>, ApsisError> {
    use entities::attribute_definition::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .order_by_asc(Column::Id)
        .offset(page * DEFAULT_PAGE_SIZE)
        .limit(DEFAULT_PAGE_SIZE)
        .all(db)
        .await?)
}

/// The authoritative definition map for a business, keyed by id, as the
/// decision engine consumes it.
pub async fn definition_map(
    db: &impl ConnectionTrait,
    biz_id: i64,
) -> Result<HashMap<i64, AttributeDef>, ApsisError> {
    use entities::attribute_definition::{Column, Entity};
    let rows = Entity::find().filter(Column::BizId.eq(biz_id)).all(db).await?;
    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        map.insert(
            row.id,
            AttributeDef {
                id: row.id,
                name: row.name,
                data_type: DataType::from_str(&row.data_type)?,
                entity_type: EntityType::from_str(&row.entity_type)?,
            },
        );
    }
    Ok(map)
}

pub async fn delete_definition(
    db: &impl ConnectionTrait,
    biz_id: i64,
    id: i64,
) -> Result<(), ApsisError> {
    use entities::attribute_definition::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

async fn validate_value(
    db: &impl ConnectionTrait,
    biz_id: i64,
    attr_def_id: i64,
    value: &str,
) -> Result<(), ApsisError> {
    let def = get_definition(db, biz_id, attr_def_id)
        .await?
        .ok_or_else(|| ApsisError::AttributeNotFound(attr_def_id.to_string()))?;
    if !def.validation_rule.is_empty() {
        let re = regex::Regex::new(&def.validation_rule)
            .map_err(|e| ApsisError::InvalidParameter(format!("validation_rule: {e}")))?;
        if !re.is_match(value) {
            return Err(ApsisError::InvalidParameter(format!(
                "value {value:?} does not match validation rule for attribute {}",
                def.name
            )));
        }
    }
    Ok(())
}

/// Upserts a subject attribute value (unique per biz/subject/definition).
pub async fn set_subject_value(
    db: &impl ConnectionTrait,
    biz_id: i64,
    subject_id: i64,
    attr_def_id: i64,
    value: &str,
) -> Result<(), ApsisError> {
    use entities::subject_attribute_value::{ActiveModel, Column, Entity};
    validate_value(db, biz_id, attr_def_id, value).await?;
    let now = now_ms();
    let existing = Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::SubjectId.eq(subject_id))
        .filter(Column::AttrDefId.eq(attr_def_id))
        .one(db)
        .await?;
    match existing {
        Some(row) => {
            let mut active: ActiveModel = row.into();
            active.value = Set(value.to_string());
            active.utime = Set(now);
            active.update(db).await?;
        }
        None => {
            let row = ActiveModel {
                biz_id: Set(biz_id),
                subject_id: Set(subject_id),
                attr_def_id: Set(attr_def_id),
                value: Set(value.to_string()),
                ctime: Set(now),
                utime: Set(now),
                ..Default::default()
            };
            row.insert(db)
                .await
                .map_err(|e| ApsisError::from_insert(e, "subject attribute value"))?;
        }
    }
    Ok(())
}

pub async fn subject_values(
    db: &impl ConnectionTrait,
    biz_id: i64,
    subject_id: i64,
) -> Result<Vec<entities::subject_attribute_value::Model>, ApsisError> {
    use entities::subject_attribute_value::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::SubjectId.eq(subject_id))
        .all(db)
        .await?)
}

pub async fn delete_subject_value(
    db: &impl ConnectionTrait,
    biz_id: i64,
    subject_id: i64,
    attr_def_id: i64,
) -> Result<(), ApsisError> {
    use entities::subject_attribute_value::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::SubjectId.eq(subject_id))
        .filter(Column::AttrDefId.eq(attr_def_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Upserts a resource attribute value (unique per biz/resource/definition).
pub async fn set_resource_value(
    db: &impl ConnectionTrait,
    biz_id: i64,
    resource_id: i64,
    attr_def_id: i64,
    value: &str,
) -> Result<(), ApsisError> {
    use entities::resource_attribute_value::{ActiveModel, Column, Entity};
    validate_value(db, biz_id, attr_def_id, value).await?;
    let now = now_ms();
    let existing = Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::ResourceId.eq(resource_id))
        .filter(Column::AttrDefId.eq(attr_def_id))
        .one(db)
        .await?;
    match existing {
        Some(row) => {
            let mut active: ActiveModel = row.into();
            active.value = Set(value.to_string());
            active.utime = Set(now);
            active.update(db).await?;
        }
        None => {
            let row = ActiveModel {
                biz_id: Set(biz_id),
                resource_id: Set(resource_id),
                attr_def_id: Set(attr_def_id),
                value: Set(value.to_string()),
                ctime: Set(now),
                utime: Set(now),
                ..Default::default()
            };
            row.insert(db)
                .await
                .map_err(|e| ApsisError::from_insert(e, "resource attribute value"))?;
        }
    }
    Ok(())
}

pub async fn resource_values(
    db: &impl ConnectionTrait,
    biz_id: i64,
    resource_id: i64,
) -> Result<Vec<entities::resource_attribute_value::Model>, ApsisError> {
    use entities::resource_attribute_value::{Column, Entity};
    Ok(Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::ResourceId.eq(resource_id))
        .all(db)
        .await?)
}

pub async fn delete_resource_value(
    db: &impl ConnectionTrait,
    biz_id: i64,
    resource_id: i64,
    attr_def_id: i64,
) -> Result<(), ApsisError> {
    use entities::resource_attribute_value::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::ResourceId.eq(resource_id))
        .filter(Column::AttrDefId.eq(attr_def_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Upserts a biz-wide environment attribute value.
pub async fn set_environment_value(
    db: &impl ConnectionTrait,
    biz_id: i64,
    attr_def_id: i64,
    value: &str,
) -> Result<(), ApsisError> {
    use entities::environment_attribute_value::{ActiveModel, Column, Entity};
    validate_value(db, biz_id, attr_def_id, value).await?;
    let now = now_ms();
    let existing = Entity::find()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::AttrDefId.eq(attr_def_id))
        .one(db)
        .await?;
    match existing {
        Some(row) => {
            let mut active: ActiveModel = row.into();
            active.value = Set(value.to_string());
            active.utime = Set(now);
            active.update(db).await?;
        }
        None => {
            let row = ActiveModel {
                biz_id: Set(biz_id),
                attr_def_id: Set(attr_def_id),
                value: Set(value.to_string()),
                ctime: Set(now),
                utime: Set(now),
                ..Default::default()
            };
            row.insert(db)
                .await
                .map_err(|e| ApsisError::from_insert(e, "environment attribute value"))?;
        }
    }
    Ok(())
}

pub async fn environment_values(
    db: &impl ConnectionTrait,
    biz_id: i64,
) -> Result<Vec<entities::environment_attribute_value::Model>, ApsisError> {
    use entities::environment_attribute_value::{Column, Entity};
    Ok(Entity::find().filter(Column::BizId.eq(biz_id)).all(db).await?)
}

pub async fn delete_environment_value(
    db: &impl ConnectionTrait,
    biz_id: i64,
    attr_def_id: i64,
) -> Result<(), ApsisError> {
    use entities::environment_attribute_value::{Column, Entity};
    Entity::delete_many()
        .filter(Column::BizId.eq(biz_id))
        .filter(Column::AttrDefId.eq(attr_def_id))
        .exec(db)
        .await?;
    Ok(())
}
