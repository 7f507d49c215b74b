use crate::models::{LightItem, MediaSource, MediaType};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "media_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub media_type: String, // 'movie', 'episode', 'musicvideo', 'external'
    pub source: String,     // 'lib', 'ext', 'manual'
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<String>,
    pub host_library_id: Option<i64>,
    pub title: String,
    pub year: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub plot: Option<String>,
    pub rating: Option<f32>,
    pub votes: Option<i32>,
    pub duration_seconds: Option<i64>,
    pub mpaa: Option<String>,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub studio: Option<String>,
    pub country: Option<String>,
    pub writer: Option<String>,
    pub play_url: Option<String>,
    pub poster: Option<String>,
    pub fanart: Option<String>,
    pub last_seen_scan_id: Option<i64>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::list_items::Entity")]
    ListItems,
}

impl Related<super::list_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ListItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn get_media_type(&self) -> Option<MediaType> {
        MediaType::from_str(&self.media_type)
    }

    pub fn get_source(&self) -> Option<MediaSource> {
        MediaSource::from_str(&self.source)
    }

    pub fn is_library_owned(&self) -> bool {
        self.source == MediaSource::Lib.as_str()
    }

    /// Project back into provider shape, used for fingerprint comparison.
    pub fn to_light(&self) -> LightItem {
        LightItem {
            host_library_id: self.host_library_id.unwrap_or_default(),
            title: self.title.clone(),
            year: self.year,
            imdb_id: self.imdb_id.clone(),
            tmdb_id: self.tmdb_id.clone(),
            plot: self.plot.clone(),
            rating: self.rating,
            votes: self.votes,
            duration_seconds: self.duration_seconds,
            mpaa: self.mpaa.clone(),
            genre: self.genre.clone(),
            director: self.director.clone(),
            studio: self.studio.clone(),
            country: self.country.clone(),
            writer: self.writer.clone(),
            play_url: self.play_url.clone(),
            poster: self.poster.clone(),
            fanart: self.fanart.clone(),
        }
    }
}
