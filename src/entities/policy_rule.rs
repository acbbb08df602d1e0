use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One node of a policy's rule forest. A leaf has left_id = right_id = 0
/// and compares the referenced attribute against `value` with `operator`;
/// an internal node combines children with AND/OR/NOT (NOT uses only the
/// right child).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "policy_rules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub biz_id: i64,
    pub policy_id: i64,
    pub attr_def_id: i64,
    pub value: String,
    pub operator: String,
    pub left_id: i64,
    pub right_id: i64,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
