use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unique per (biz_id, resource_type, resource_key).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resources")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub biz_id: i64,
    pub resource_type: String,
    pub resource_key: String,
    pub name: String,
    pub description: String,
    pub metadata: String,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
