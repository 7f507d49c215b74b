use super::BaseRepository;
use crate::db::entities::{
    PendingKind, PendingOperation, PendingOperationActiveModel, PendingOperationModel, SyncState,
    SyncStateActiveModel, SyncStateModel, pending_operations,
};
use crate::models::ImdbId;
use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

const SINGLETON_ID: i32 = 1;

/// Reconciler state: the snapshot singleton plus the durable pending queue.
#[derive(Debug)]
pub struct SyncRepositoryImpl {
    base: BaseRepository,
}

impl SyncRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Fetch the singleton row, creating an empty one on first use.
    pub async fn get_or_init(&self) -> Result<SyncStateModel> {
        if let Some(state) = SyncState::find_by_id(SINGLETON_ID)
            .one(self.base.db.as_ref())
            .await?
        {
            return Ok(state);
        }
        let active = SyncStateActiveModel {
            id: Set(SINGLETON_ID),
            local_snapshot: Set(serde_json::json!([])),
            server_version: Set(None),
            server_etag: Set(None),
            last_sync_at: Set(None),
        };
        Ok(active.insert(self.base.db.as_ref()).await?)
    }

    /// The last fully reconciled id set.
    pub async fn snapshot(&self) -> Result<BTreeSet<ImdbId>> {
        let state = self.get_or_init().await?;
        let raw: Vec<String> =
            serde_json::from_value(state.local_snapshot).context("Malformed local_snapshot")?;
        Ok(raw.iter().filter_map(|s| ImdbId::parse(s)).collect())
    }

    /// Persist the reconciled set with the server's version/etag pair.
    pub async fn save_snapshot(
        &self,
        snapshot: &BTreeSet<ImdbId>,
        server_version: Option<&str>,
        server_etag: Option<&str>,
    ) -> Result<()> {
        self.get_or_init().await?;
        let sorted: Vec<&str> = snapshot.iter().map(ImdbId::as_str).collect();
        let active = SyncStateActiveModel {
            id: Set(SINGLETON_ID),
            local_snapshot: Set(serde_json::json!(sorted)),
            server_version: Set(server_version.map(str::to_string)),
            server_etag: Set(server_etag.map(str::to_string)),
            last_sync_at: Set(Some(chrono::Utc::now().naive_utc())),
        };
        active.update(self.base.db.as_ref()).await?;
        Ok(())
    }

    /// Append a batch to the queue with a fresh idempotency key.
    pub async fn enqueue(&self, kind: PendingKind, ids: &[ImdbId]) -> Result<PendingOperationModel> {
        let id_strings: Vec<&str> = ids.iter().map(ImdbId::as_str).collect();
        let active = PendingOperationActiveModel {
            operation: Set(kind.as_str().to_string()),
            imdb_ids: Set(serde_json::json!(id_strings)),
            idempotency_key: Set(Uuid::new_v4().to_string()),
            retry_count: Set(0),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };
        Ok(active.insert(self.base.db.as_ref()).await?)
    }

    /// Queue contents in drain order: FIFO per (operation, created_at).
    pub async fn pending(&self) -> Result<Vec<PendingOperationModel>> {
        Ok(PendingOperation::find()
            .order_by_asc(pending_operations::Column::Operation)
            .order_by_asc(pending_operations::Column::CreatedAt)
            .order_by_asc(pending_operations::Column::Id)
            .all(self.base.db.as_ref())
            .await?)
    }

    pub async fn pending_count(&self) -> Result<u64> {
        Ok(PendingOperation::find()
            .count(self.base.db.as_ref())
            .await?)
    }

    /// Remove a delivered (or permanently rejected) operation.
    pub async fn remove_operation(&self, id: i64) -> Result<()> {
        PendingOperation::delete_by_id(id)
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    /// Record a transient failure; the operation stays queued with the same
    /// idempotency key.
    pub async fn bump_retry(&self, id: i64) -> Result<()> {
        if let Some(op) = PendingOperation::find_by_id(id)
            .one(self.base.db.as_ref())
            .await?
        {
            let retries = op.retry_count + 1;
            let mut active: PendingOperationActiveModel = op.into();
            active.retry_count = Set(retries);
            active.update(self.base.db.as_ref()).await?;
        }
        Ok(())
    }

    /// Decode the ids carried by a queued operation.
    pub fn decode_ids(op: &PendingOperationModel) -> Result<Vec<ImdbId>> {
        let raw: Vec<String> =
            serde_json::from_value(op.imdb_ids.clone()).context("Malformed pending imdb_ids")?;
        Ok(raw.iter().filter_map(|s| ImdbId::parse(s)).collect())
    }

    pub async fn clear_queue(&self) -> Result<u64> {
        let res = PendingOperation::delete_many()
            .filter(pending_operations::Column::Id.gt(0))
            .exec(self.base.db.as_ref())
            .await?;
        Ok(res.rows_affected)
    }
}
