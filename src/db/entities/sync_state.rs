use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Singleton row (id = 1). `local_snapshot` is the last fully reconciled set
/// of IMDb ids, sorted and normalized; diffs are computed against it, never
/// against the live library directly.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    #[sea_orm(column_type = "Json")]
    pub local_snapshot: Json,
    pub server_version: Option<String>,
    pub server_etag: Option<String>,
    pub last_sync_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
