use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A user holds the role only while now is inside [start_time, end_time);
/// a zero end_time means unbounded.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_roles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub biz_id: i64,
    pub user_id: i64,
    pub role_id: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
