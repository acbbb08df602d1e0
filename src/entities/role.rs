use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unique per (biz_id, role_type, name). `start_time`/`end_time` bound
/// temporary roles; zero means unbounded.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "roles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub biz_id: i64,
    /// "system" | "custom" | "temporary"
    pub role_type: String,
    pub name: String,
    pub description: String,
    pub metadata: String,
    pub start_time: i64,
    pub end_time: i64,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
