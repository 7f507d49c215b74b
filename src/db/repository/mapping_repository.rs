use super::BaseRepository;
use crate::db::entities::{ImdbMapping, ImdbMappingActiveModel, ImdbMappingModel, imdb_mappings};
use crate::models::{ImdbId, MediaType};
use anyhow::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set,
};
use std::sync::Arc;

/// IMDb-to-host lookup table, rebuilt wholesale after a full scan and patched
/// incrementally by delta scans.
#[derive(Debug)]
pub struct MappingRepositoryImpl {
    base: BaseRepository,
}

impl MappingRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn find_by_imdb(&self, imdb_id: &ImdbId) -> Result<Vec<ImdbMappingModel>> {
        Ok(ImdbMapping::find()
            .filter(imdb_mappings::Column::ImdbId.eq(imdb_id.as_str()))
            .all(self.base.db.as_ref())
            .await?)
    }

    pub async fn find_one_by_imdb(&self, imdb_id: &ImdbId) -> Result<Option<ImdbMappingModel>> {
        Ok(ImdbMapping::find()
            .filter(imdb_mappings::Column::ImdbId.eq(imdb_id.as_str()))
            .one(self.base.db.as_ref())
            .await?)
    }

    pub async fn upsert(
        &self,
        imdb_id: &ImdbId,
        host_library_id: i64,
        media_type: MediaType,
    ) -> Result<()> {
        let existing = ImdbMapping::find()
            .filter(imdb_mappings::Column::ImdbId.eq(imdb_id.as_str()))
            .filter(imdb_mappings::Column::HostLibraryId.eq(host_library_id))
            .filter(imdb_mappings::Column::MediaType.eq(media_type.as_str()))
            .one(self.base.db.as_ref())
            .await?;
        if existing.is_none() {
            let active = ImdbMappingActiveModel {
                imdb_id: Set(imdb_id.as_str().to_string()),
                host_library_id: Set(host_library_id),
                media_type: Set(media_type.as_str().to_string()),
                ..Default::default()
            };
            active.insert(self.base.db.as_ref()).await?;
        }
        Ok(())
    }

    /// Replace the whole table from scratch inside the caller's transaction.
    pub async fn rebuild_in<C: ConnectionTrait>(
        conn: &C,
        entries: &[(ImdbId, i64, MediaType)],
    ) -> Result<()> {
        ImdbMapping::delete_many().exec(conn).await?;
        for (imdb_id, host_library_id, media_type) in entries {
            let active = ImdbMappingActiveModel {
                imdb_id: Set(imdb_id.as_str().to_string()),
                host_library_id: Set(*host_library_id),
                media_type: Set(media_type.as_str().to_string()),
                ..Default::default()
            };
            active.insert(conn).await?;
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(ImdbMapping::find().count(self.base.db.as_ref()).await?)
    }
}
