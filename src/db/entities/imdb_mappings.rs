use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// IMDb id to host library id mapping, rebuilt on every full scan.
/// Unique on the `(imdb_id, host_library_id, media_type)` triple.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "imdb_mappings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub imdb_id: String,
    pub host_library_id: i64,
    pub media_type: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
