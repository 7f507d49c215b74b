pub mod identifiers;

pub use identifiers::{ImdbId, InvalidImdbId, normalize_imdb_ids};

use serde::{Deserialize, Serialize};

/// Kind of indexed item. External plugin items share the table with library
/// movies and episodes but carry their own identity tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Movie,
    Episode,
    MusicVideo,
    External,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Episode => "episode",
            MediaType::MusicVideo => "musicvideo",
            MediaType::External => "external",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(MediaType::Movie),
            "episode" => Some(MediaType::Episode),
            "musicvideo" => Some(MediaType::MusicVideo),
            "external" => Some(MediaType::External),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an indexed row came from. Library rows are owned by the scanner and
/// may be swept; ext/manual rows persist independently of scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaSource {
    Lib,
    Ext,
    Manual,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::Lib => "lib",
            MediaSource::Ext => "ext",
            MediaSource::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "lib" => Some(MediaSource::Lib),
            "ext" => Some(MediaSource::Ext),
            "manual" => Some(MediaSource::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Light metadata for one item as produced by a library provider page.
///
/// Heavy fields (cast, stream details, per-source ratings) never travel with
/// this struct; they are fetched on demand via the extended bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LightItem {
    pub host_library_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<String>,
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
}

impl LightItem {
    /// Change-detection fingerprint used by the delta scan when the provider
    /// has no change token.
    pub fn fingerprint(&self) -> (i64, &str, Option<i32>, Option<&str>, Option<i64>) {
        (
            self.host_library_id,
            self.title.as_str(),
            self.year,
            self.imdb_id.as_deref(),
            self.duration_seconds,
        )
    }
}

/// Opaque heavy-metadata bag cached by `(media_type, host_library_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedBag(pub serde_json::Value);

/// Which fields a keyword query inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    Title,
    Plot,
    #[default]
    Both,
}

impl SearchScope {
    pub fn includes_title(&self) -> bool {
        matches!(self, SearchScope::Title | SearchScope::Both)
    }

    pub fn includes_plot(&self) -> bool {
        matches!(self, SearchScope::Plot | SearchScope::Both)
    }
}

/// Whether every keyword must match, or any one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMatch {
    #[default]
    All,
    Any,
}

/// Scan flavor recorded in the scan log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Full,
    Delta,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Full => "full",
            ScanType::Delta => "delta",
        }
    }
}
