use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Attaches a policy to a permission; the policy contributes an
/// allow/deny vote when it matches. Unique per (biz_id, permission_id,
/// policy_id).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permission_policies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub biz_id: i64,
    pub permission_id: i64,
    pub policy_id: i64,
    /// "allow" | "deny"
    pub effect: String,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
