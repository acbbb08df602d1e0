use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unique per (biz_id, name).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attribute_definitions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub biz_id: i64,
    pub name: String,
    pub description: String,
    /// "string" | "number" | "boolean" | "float" | "datetime" | "array"
    pub data_type: String,
    /// "subject" | "resource" | "environment"
    pub entity_type: String,
    /// Optional regex a value must match; empty disables validation.
    pub validation_rule: String,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
