use super::BaseRepository;
use crate::db::entities::{ScanLog, ScanLogActiveModel, ScanLogModel, scan_logs};
use crate::models::ScanType;
use anyhow::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

#[derive(Debug)]
pub struct ScanRepositoryImpl {
    base: BaseRepository,
}

impl ScanRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Open a log row at scan start; its id doubles as the scan id stamped
    /// onto upserted items.
    pub async fn start(&self, scan_type: ScanType, host_version: Option<i32>) -> Result<ScanLogModel> {
        let active = ScanLogActiveModel {
            scan_type: Set(scan_type.as_str().to_string()),
            started_at: Set(chrono::Utc::now().naive_utc()),
            host_version: Set(host_version),
            ..Default::default()
        };
        Ok(active.insert(self.base.db.as_ref()).await?)
    }

    /// Close a log row with final counts and optional error.
    pub async fn finish(
        &self,
        id: i64,
        items_added: i32,
        items_updated: i32,
        items_removed: i32,
        error: Option<&str>,
        change_token: Option<&str>,
    ) -> Result<()> {
        let active = ScanLogActiveModel {
            id: Set(id),
            finished_at: Set(Some(chrono::Utc::now().naive_utc())),
            items_added: Set(items_added),
            items_updated: Set(items_updated),
            items_removed: Set(items_removed),
            error: Set(error.map(str::to_string)),
            change_token: Set(change_token.map(str::to_string)),
            ..Default::default()
        };
        active.update(self.base.db.as_ref()).await?;
        Ok(())
    }

    pub async fn latest(&self) -> Result<Option<ScanLogModel>> {
        Ok(ScanLog::find()
            .order_by_desc(scan_logs::Column::Id)
            .one(self.base.db.as_ref())
            .await?)
    }

    /// Host major version recorded by the most recent scan that completed
    /// without error.
    pub async fn last_successful_host_version(&self) -> Result<Option<i32>> {
        let row = ScanLog::find()
            .filter(scan_logs::Column::Error.is_null())
            .filter(scan_logs::Column::FinishedAt.is_not_null())
            .order_by_desc(scan_logs::Column::Id)
            .one(self.base.db.as_ref())
            .await?;
        Ok(row.and_then(|log| log.host_version))
    }

    /// Change token recorded by the most recent successful scan.
    pub async fn last_change_token(&self) -> Result<Option<String>> {
        let row = ScanLog::find()
            .filter(scan_logs::Column::Error.is_null())
            .filter(scan_logs::Column::FinishedAt.is_not_null())
            .filter(scan_logs::Column::ChangeToken.is_not_null())
            .order_by_desc(scan_logs::Column::Id)
            .one(self.base.db.as_ref())
            .await?;
        Ok(row.and_then(|log| log.change_token))
    }
}
