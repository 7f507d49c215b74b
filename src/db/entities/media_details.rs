use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Heavy-metadata cache. The bag is opaque to the engine: cast, per-source
/// ratings, stream details, and unique-id blobs pass through unparsed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "media_details")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub media_type: String,
    pub host_library_id: i64,
    #[sea_orm(column_type = "Json")]
    pub details: Json,
    pub fetched_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
