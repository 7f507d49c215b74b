use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Durable queue of add/remove batches awaiting delivery to the remote.
/// Drained FIFO by `(operation, created_at)`; the idempotency key never
/// changes across retries.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_operations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub operation: String, // 'add' | 'remove'
    #[sea_orm(column_type = "Json")]
    pub imdb_ids: Json,
    pub idempotency_key: String,
    pub retry_count: i32,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Queue operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingKind {
    Add,
    Remove,
}

impl PendingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingKind::Add => "add",
            PendingKind::Remove => "remove",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "add" => Some(PendingKind::Add),
            "remove" => Some(PendingKind::Remove),
            _ => None,
        }
    }
}
