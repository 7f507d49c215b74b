use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "scan_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub scan_type: String, // 'full' | 'delta'
    pub started_at: DateTime,
    pub finished_at: Option<DateTime>,
    pub items_added: i32,
    pub items_updated: i32,
    pub items_removed: i32,
    pub error: Option<String>,
    /// Provider major version observed during the scan; a later mismatch
    /// forces a full rescan.
    pub host_version: Option<i32>,
    /// Provider change token at scan completion; seeds the next delta scan.
    pub change_token: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
