use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unique per (biz_id, resource_id, action). Resource type/key are
/// denormalized so a check can find candidates without a join.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub biz_id: i64,
    pub name: String,
    pub description: String,
    pub resource_id: i64,
    pub resource_type: String,
    pub resource_key: String,
    /// "create" | "read" | "update" | "delete" | "execute" | "export" | "import"
    pub action: String,
    pub metadata: String,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
