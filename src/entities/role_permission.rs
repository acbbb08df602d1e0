use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role-to-permission edge with the permission's resource/action
/// denormalized for snapshot assembly.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "role_permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub biz_id: i64,
    pub role_id: i64,
    pub permission_id: i64,
    pub resource_type: String,
    pub resource_key: String,
    pub permission_action: String,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
