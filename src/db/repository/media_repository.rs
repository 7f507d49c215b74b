use super::{BaseRepository, Repository};
use crate::db::entities::{
    MediaDetail, MediaDetailActiveModel, MediaDetailModel, MediaItem, MediaItemActiveModel,
    MediaItemModel, media_details, media_items,
};
use crate::models::{ImdbId, LightItem, MediaSource, MediaType};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What a page upsert did with one provider row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
    Unchanged,
}

/// Repository for indexed media items and their heavy-metadata cache.
#[async_trait]
pub trait MediaRepository: Repository<MediaItemModel> {
    /// Find items carrying the given (already normalized) IMDb id.
    async fn find_by_imdb(&self, imdb_id: &str) -> Result<Vec<MediaItemModel>>;

    /// Find items carrying the given TMDb id.
    async fn find_by_tmdb(&self, tmdb_id: &str) -> Result<Vec<MediaItemModel>>;

    /// Find the library row for `(media_type, host_library_id)`.
    async fn find_by_type_and_host(
        &self,
        media_type: MediaType,
        host_library_id: i64,
    ) -> Result<Option<MediaItemModel>>;

    /// All `source=lib` rows of the given type.
    async fn find_library_items(&self, media_type: MediaType) -> Result<Vec<MediaItemModel>>;

    /// Distinct normalized IMDb ids present on `source=lib` rows.
    async fn library_imdb_set(&self) -> Result<BTreeSet<ImdbId>>;

    /// Library candidates for `(title, year)` matching; the caller folds
    /// titles before comparing.
    async fn find_by_year(&self, year: i32) -> Result<Vec<MediaItemModel>>;

    /// External item matched by its play URL.
    async fn find_external_by_play_url(&self, play_url: &str) -> Result<Option<MediaItemModel>>;

    /// External item matched by its `(title, year, play_url)` identity tuple.
    async fn find_external_by_identity(
        &self,
        title: &str,
        year: Option<i32>,
        play_url: Option<&str>,
    ) -> Result<Option<MediaItemModel>>;

    /// Create a `source=ext` placeholder row.
    async fn insert_external(
        &self,
        media_type: MediaType,
        title: &str,
        year: Option<i32>,
        imdb_id: Option<&str>,
        tmdb_id: Option<&str>,
        play_url: Option<&str>,
    ) -> Result<MediaItemModel>;

    /// Delete `source=lib` rows of the given types not seen by `scan_id`.
    /// Only runs after every page upsert succeeded.
    async fn sweep_not_seen(&self, media_types: &[MediaType], scan_id: i64) -> Result<u64>;

    /// Cached heavy-metadata bag for `(media_type, host_library_id)`.
    async fn find_details(
        &self,
        media_type: MediaType,
        host_library_id: i64,
    ) -> Result<Option<MediaDetailModel>>;

    /// Insert or replace the heavy-metadata bag.
    async fn save_details(
        &self,
        media_type: MediaType,
        host_library_id: i64,
        details: serde_json::Value,
    ) -> Result<()>;
}

#[derive(Debug)]
pub struct MediaRepositoryImpl {
    base: BaseRepository,
}

impl MediaRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Upsert one provider row inside the caller's page transaction.
    ///
    /// Matches on `(media_type, host_library_id)`; stamps `last_seen_scan_id`
    /// either way so the sweep can tell survivors from leftovers.
    pub async fn upsert_light_in<C: ConnectionTrait>(
        conn: &C,
        media_type: MediaType,
        item: &LightItem,
        scan_id: i64,
    ) -> Result<UpsertOutcome> {
        let existing = MediaItem::find()
            .filter(media_items::Column::MediaType.eq(media_type.as_str()))
            .filter(media_items::Column::HostLibraryId.eq(item.host_library_id))
            .one(conn)
            .await?;

        let normalized_imdb = item
            .imdb_id
            .as_deref()
            .and_then(ImdbId::parse)
            .map(ImdbId::into_string);

        match existing {
            Some(row) => {
                let changed = row.to_light().fingerprint() != item.fingerprint();
                let mut active: MediaItemActiveModel = row.into();
                if changed {
                    active.title = Set(item.title.clone());
                    active.year = Set(item.year);
                    active.imdb_id = Set(normalized_imdb);
                    active.tmdb_id = Set(item.tmdb_id.clone());
                    active.plot = Set(item.plot.clone());
                    active.rating = Set(item.rating);
                    active.votes = Set(item.votes);
                    active.duration_seconds = Set(item.duration_seconds);
                    active.mpaa = Set(item.mpaa.clone());
                    active.genre = Set(item.genre.clone());
                    active.director = Set(item.director.clone());
                    active.studio = Set(item.studio.clone());
                    active.country = Set(item.country.clone());
                    active.writer = Set(item.writer.clone());
                    active.play_url = Set(item.play_url.clone());
                    active.poster = Set(item.poster.clone());
                    active.fanart = Set(item.fanart.clone());
                }
                active.last_seen_scan_id = Set(Some(scan_id));
                active.update(conn).await?;
                Ok(if changed {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Unchanged
                })
            }
            None => {
                let active = MediaItemActiveModel {
                    media_type: Set(media_type.as_str().to_string()),
                    source: Set(MediaSource::Lib.as_str().to_string()),
                    imdb_id: Set(normalized_imdb),
                    tmdb_id: Set(item.tmdb_id.clone()),
                    host_library_id: Set(Some(item.host_library_id)),
                    title: Set(item.title.clone()),
                    year: Set(item.year),
                    plot: Set(item.plot.clone()),
                    rating: Set(item.rating),
                    votes: Set(item.votes),
                    duration_seconds: Set(item.duration_seconds),
                    mpaa: Set(item.mpaa.clone()),
                    genre: Set(item.genre.clone()),
                    director: Set(item.director.clone()),
                    studio: Set(item.studio.clone()),
                    country: Set(item.country.clone()),
                    writer: Set(item.writer.clone()),
                    play_url: Set(item.play_url.clone()),
                    poster: Set(item.poster.clone()),
                    fanart: Set(item.fanart.clone()),
                    last_seen_scan_id: Set(Some(scan_id)),
                    created_at: Set(chrono::Utc::now().naive_utc()),
                    ..Default::default()
                };
                active.insert(conn).await?;
                Ok(UpsertOutcome::Added)
            }
        }
    }

    /// Delete the library row for `(media_type, host_library_id)`, as reported
    /// removed by a delta scan.
    pub async fn delete_library_row(
        &self,
        media_type: MediaType,
        host_library_id: i64,
    ) -> Result<u64> {
        let res = MediaItem::delete_many()
            .filter(media_items::Column::Source.eq(MediaSource::Lib.as_str()))
            .filter(media_items::Column::MediaType.eq(media_type.as_str()))
            .filter(media_items::Column::HostLibraryId.eq(host_library_id))
            .exec(self.base.db.as_ref())
            .await?;
        Ok(res.rows_affected)
    }
}

#[async_trait]
impl Repository<MediaItemModel> for MediaRepositoryImpl {
    type Entity = MediaItem;

    async fn find_by_id(&self, id: i64) -> Result<Option<MediaItemModel>> {
        Ok(MediaItem::find_by_id(id).one(self.base.db.as_ref()).await?)
    }

    async fn find_all(&self) -> Result<Vec<MediaItemModel>> {
        Ok(MediaItem::find().all(self.base.db.as_ref()).await?)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        MediaItem::delete_by_id(id)
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(MediaItem::find().count(self.base.db.as_ref()).await?)
    }
}

#[async_trait]
impl MediaRepository for MediaRepositoryImpl {
    async fn find_by_imdb(&self, imdb_id: &str) -> Result<Vec<MediaItemModel>> {
        Ok(MediaItem::find()
            .filter(media_items::Column::ImdbId.eq(imdb_id))
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn find_by_tmdb(&self, tmdb_id: &str) -> Result<Vec<MediaItemModel>> {
        Ok(MediaItem::find()
            .filter(media_items::Column::TmdbId.eq(tmdb_id))
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn find_by_type_and_host(
        &self,
        media_type: MediaType,
        host_library_id: i64,
    ) -> Result<Option<MediaItemModel>> {
        Ok(MediaItem::find()
            .filter(media_items::Column::MediaType.eq(media_type.as_str()))
            .filter(media_items::Column::HostLibraryId.eq(host_library_id))
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn find_library_items(&self, media_type: MediaType) -> Result<Vec<MediaItemModel>> {
        Ok(MediaItem::find()
            .filter(media_items::Column::Source.eq(MediaSource::Lib.as_str()))
            .filter(media_items::Column::MediaType.eq(media_type.as_str()))
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn library_imdb_set(&self) -> Result<BTreeSet<ImdbId>> {
        let rows = MediaItem::find()
            .filter(media_items::Column::Source.eq(MediaSource::Lib.as_str()))
            .filter(media_items::Column::ImdbId.is_not_null())
            .all(self.base.db.as_ref())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.imdb_id.as_deref().and_then(ImdbId::parse))
            .collect())
    }

    async fn find_by_year(&self, year: i32) -> Result<Vec<MediaItemModel>> {
        Ok(MediaItem::find()
            .filter(media_items::Column::Year.eq(year))
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn find_external_by_play_url(&self, play_url: &str) -> Result<Option<MediaItemModel>> {
        Ok(MediaItem::find()
            .filter(media_items::Column::Source.eq(MediaSource::Ext.as_str()))
            .filter(media_items::Column::PlayUrl.eq(play_url))
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn find_external_by_identity(
        &self,
        title: &str,
        year: Option<i32>,
        play_url: Option<&str>,
    ) -> Result<Option<MediaItemModel>> {
        let mut query = MediaItem::find()
            .filter(media_items::Column::Source.eq(MediaSource::Ext.as_str()))
            .filter(media_items::Column::Title.eq(title));
        query = match year {
            Some(y) => query.filter(media_items::Column::Year.eq(y)),
            None => query.filter(media_items::Column::Year.is_null()),
        };
        query = match play_url {
            Some(url) => query.filter(media_items::Column::PlayUrl.eq(url)),
            None => query.filter(media_items::Column::PlayUrl.is_null()),
        };
        Ok(query.one(self.base.db.as_ref()).await?)
    }

    async fn insert_external(
        &self,
        media_type: MediaType,
        title: &str,
        year: Option<i32>,
        imdb_id: Option<&str>,
        tmdb_id: Option<&str>,
        play_url: Option<&str>,
    ) -> Result<MediaItemModel> {
        let normalized_imdb = imdb_id.and_then(ImdbId::parse).map(ImdbId::into_string);
        let active = MediaItemActiveModel {
            media_type: Set(media_type.as_str().to_string()),
            source: Set(MediaSource::Ext.as_str().to_string()),
            imdb_id: Set(normalized_imdb),
            tmdb_id: Set(tmdb_id.map(str::to_string)),
            title: Set(title.to_string()),
            year: Set(year),
            play_url: Set(play_url.map(str::to_string)),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };
        Ok(active.insert(self.base.db.as_ref()).await?)
    }

    async fn sweep_not_seen(&self, media_types: &[MediaType], scan_id: i64) -> Result<u64> {
        let type_names: Vec<&str> = media_types.iter().map(MediaType::as_str).collect();
        let res = MediaItem::delete_many()
            .filter(media_items::Column::Source.eq(MediaSource::Lib.as_str()))
            .filter(media_items::Column::MediaType.is_in(type_names))
            .filter(
                media_items::Column::LastSeenScanId
                    .ne(scan_id)
                    .or(media_items::Column::LastSeenScanId.is_null()),
            )
            .exec(self.base.db.as_ref())
            .await?;
        Ok(res.rows_affected)
    }

    async fn find_details(
        &self,
        media_type: MediaType,
        host_library_id: i64,
    ) -> Result<Option<MediaDetailModel>> {
        Ok(MediaDetail::find()
            .filter(media_details::Column::MediaType.eq(media_type.as_str()))
            .filter(media_details::Column::HostLibraryId.eq(host_library_id))
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn save_details(
        &self,
        media_type: MediaType,
        host_library_id: i64,
        details: serde_json::Value,
    ) -> Result<()> {
        let existing = self.find_details(media_type, host_library_id).await?;
        match existing {
            Some(row) => {
                let mut active: MediaDetailActiveModel = row.into();
                active.details = Set(details);
                active.fetched_at = Set(chrono::Utc::now().naive_utc());
                active.update(self.base.db.as_ref()).await?;
            }
            None => {
                let active = MediaDetailActiveModel {
                    media_type: Set(media_type.as_str().to_string()),
                    host_library_id: Set(host_library_id),
                    details: Set(details),
                    fetched_at: Set(chrono::Utc::now().naive_utc()),
                    ..Default::default()
                };
                active.insert(self.base.db.as_ref()).await?;
            }
        }
        Ok(())
    }
}
