use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::BACKUP_SCHEMA_VERSION;

/// One NDJSON line. Readers ignore unknown keys and unknown record types so
/// the format stays forward compatible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "lowercase")]
pub enum BackupRecord {
    Folder(FolderRecord),
    List(ListRecord),
    Item(ItemRecord),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRecord {
    pub schema_version: u32,
    /// Slash-separated path from the root, e.g. `Movies/Noir`.
    pub id_path: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRecord {
    pub schema_version: u32,
    /// Containing folder path; `None` for a root-level list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub schema_version: u32,
    /// Full path of the containing list, folder path plus list name.
    pub list_path: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    // Episode extras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<i32>,
    // External plugin extras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_route: Option<String>,
    pub position: i64,
}

/// Sidecar metadata written next to the `.ndjson` container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMeta {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub producer_version: String,
    pub counts: BackupCounts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupCounts {
    pub folders: usize,
    pub lists: usize,
    pub items: usize,
}

impl BackupMeta {
    pub fn new(counts: BackupCounts) -> Self {
        Self {
            schema_version: BACKUP_SCHEMA_VERSION,
            generated_at: Utc::now(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            counts,
        }
    }
}

/// Parse one NDJSON line. `Ok(None)` means the line carries an unknown
/// record type and must be skipped, not failed.
pub fn parse_line(line: &str) -> Result<Option<BackupRecord>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    match value.get("record_type").and_then(|v| v.as_str()) {
        Some("folder") | Some("list") | Some("item") => {
            Ok(Some(serde_json::from_value(value)?))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_folder_record() {
        let record = BackupRecord::Folder(FolderRecord {
            schema_version: BACKUP_SCHEMA_VERSION,
            id_path: "Movies/Noir".into(),
            name: "Noir".into(),
            created_at: Utc::now(),
        });
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains(r#""record_type":"folder""#));
        assert!(parse_line(&line).unwrap().is_some());
    }

    #[test]
    fn unknown_record_types_are_skipped() {
        let line = r#"{"record_type":"hologram","schema_version":9}"#;
        assert!(parse_line(line).unwrap().is_none());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let line = r#"{"record_type":"list","schema_version":1,"name":"L","created_at":"2026-01-01T00:00:00Z","future_field":true}"#;
        let parsed = parse_line(line).unwrap().unwrap();
        assert!(matches!(parsed, BackupRecord::List(l) if l.name == "L"));
    }
}
