use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-user overlay on top of role-derived permissions. A deny overlay
/// beats every allow for the same permission.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub biz_id: i64,
    pub user_id: i64,
    pub permission_id: i64,
    /// "allow" | "deny"
    pub effect: String,
    pub start_time: i64,
    pub end_time: i64,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
