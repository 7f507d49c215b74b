//! NDJSON export/import of folders, lists, and memberships, plus automated
//! backup rotation.

pub mod records;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::{BACKUP_FILE_PREFIX, BACKUP_SCHEMA_VERSION};
use crate::db::DatabaseConnection;
use crate::db::entities::MediaItemModel;
use crate::db::repository::Repository;
use crate::db::repository::folder_repository::{FolderRepository, FolderRepositoryImpl};
use crate::db::repository::list_repository::{ListRepository, ListRepositoryImpl};
use crate::db::repository::mapping_repository::MappingRepositoryImpl;
use crate::db::repository::media_repository::{MediaRepository, MediaRepositoryImpl};
use crate::models::{ImdbId, MediaSource, MediaType};
use crate::utils::normalize;
use records::{
    BackupCounts, BackupMeta, BackupRecord, FolderRecord, ItemRecord, ListRecord, parse_line,
};

/// How an imported item was resolved to a media row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchCounts {
    pub exact_imdb: usize,
    pub exact_tmdb: usize,
    pub title_year: usize,
    pub play_url: usize,
    pub placeholder: usize,
}

/// Structured import result; nothing is silently dropped.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub folders_created: usize,
    pub lists_created: usize,
    pub items_added: usize,
    pub items_skipped: usize,
    pub unknown_records: usize,
    pub malformed_lines: usize,
    pub matches: MatchCounts,
}

pub struct BackupEngine {
    db: DatabaseConnection,
    folders: FolderRepositoryImpl,
    lists: ListRepositoryImpl,
    media: MediaRepositoryImpl,
    mappings: MappingRepositoryImpl,
}

impl BackupEngine {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            folders: FolderRepositoryImpl::new(db.clone()),
            lists: ListRepositoryImpl::new(db.clone()),
            media: MediaRepositoryImpl::new(db.clone()),
            mappings: MappingRepositoryImpl::new(db.clone()),
            db,
        }
    }

    /// Stream the whole hierarchy to `path` in BFS folder order, then write
    /// the `.meta.json` sidecar.
    pub async fn export(&self, path: &Path) -> Result<BackupMeta> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create backup directory")?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create backup file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let mut counts = BackupCounts::default();

        // Root-level lists come first; they have no containing folder record.
        for list in self.lists.find_in_folder(None).await? {
            self.write_list(&mut writer, &list, None, &mut counts).await?;
        }

        // Folders in breadth-first order, each followed by its lists.
        let mut queue: std::collections::VecDeque<(i64, String)> = self
            .folders
            .find_children(None)
            .await?
            .into_iter()
            .map(|f| (f.id, f.name))
            .collect();
        while let Some((folder_id, path_so_far)) = queue.pop_front() {
            let folder = self
                .folders
                .find_by_id(folder_id)
                .await?
                .context("Folder vanished during export")?;
            let record = BackupRecord::Folder(FolderRecord {
                schema_version: BACKUP_SCHEMA_VERSION,
                id_path: path_so_far.clone(),
                name: folder.name.clone(),
                created_at: folder.created_at.and_utc(),
            });
            writeln!(writer, "{}", serde_json::to_string(&record)?)?;
            counts.folders += 1;

            for list in self.lists.find_in_folder(Some(folder_id)).await? {
                self.write_list(&mut writer, &list, Some(&path_so_far), &mut counts)
                    .await?;
            }
            for child in self.folders.find_children(Some(folder_id)).await? {
                queue.push_back((child.id, format!("{path_so_far}/{}", child.name)));
            }
        }

        writer.flush()?;
        let meta = BackupMeta::new(counts);
        let sidecar = sidecar_path(path);
        fs::write(&sidecar, serde_json::to_string_pretty(&meta)?)
            .with_context(|| format!("Failed to write sidecar {}", sidecar.display()))?;
        info!(
            path = %path.display(),
            folders = meta.counts.folders,
            lists = meta.counts.lists,
            items = meta.counts.items,
            "Export complete"
        );
        Ok(meta)
    }

    async fn write_list(
        &self,
        writer: &mut BufWriter<fs::File>,
        list: &crate::db::entities::ListModel,
        folder_path: Option<&str>,
        counts: &mut BackupCounts,
    ) -> Result<()> {
        let record = BackupRecord::List(ListRecord {
            schema_version: BACKUP_SCHEMA_VERSION,
            folder_path: folder_path.map(str::to_string),
            name: list.name.clone(),
            created_at: list.created_at.and_utc(),
        });
        writeln!(writer, "{}", serde_json::to_string(&record)?)?;
        counts.lists += 1;

        let list_path = match folder_path {
            Some(prefix) => format!("{prefix}/{}", list.name),
            None => list.name.clone(),
        };
        for membership in self.lists.find_items(list.id).await? {
            let Some(item) = self.media.find_by_id(membership.media_item_id).await? else {
                continue;
            };
            let record = BackupRecord::Item(item_record(&list_path, &item, membership.position));
            writeln!(writer, "{}", serde_json::to_string(&record)?)?;
            counts.items += 1;
        }
        Ok(())
    }

    /// Rebuild hierarchy and membership from an NDJSON file. Idempotent:
    /// paths and `(list, item)` tuples that already exist are reused, and
    /// malformed or unknown lines are counted rather than fatal.
    pub async fn import(&self, path: &Path) -> Result<ImportReport> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open backup file {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut report = ImportReport::default();
        let mut folder_ids: HashMap<String, i64> = HashMap::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = match parse_line(&line) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    report.unknown_records += 1;
                    continue;
                }
                Err(e) => {
                    warn!(line = line_no + 1, "Skipping malformed backup line: {e}");
                    report.malformed_lines += 1;
                    continue;
                }
            };

            match record {
                BackupRecord::Folder(folder) => {
                    self.ensure_folder_path(&folder.id_path, &mut folder_ids, &mut report)
                        .await?;
                }
                BackupRecord::List(list) => {
                    self.ensure_list(list.folder_path.as_deref(), &list.name, &mut folder_ids, &mut report)
                        .await?;
                }
                BackupRecord::Item(item) => {
                    self.import_item(&item, &mut folder_ids, &mut report).await?;
                }
            }
        }

        info!(
            folders = report.folders_created,
            lists = report.lists_created,
            items = report.items_added,
            skipped = report.items_skipped,
            "Import complete"
        );
        Ok(report)
    }

    /// Export into `dir` under a timestamped name, then prune rotated files
    /// beyond `retention`, oldest first.
    pub async fn run_rotation(&self, dir: &Path, retention: usize) -> Result<PathBuf> {
        let name = format!(
            "{BACKUP_FILE_PREFIX}{}.ndjson",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        );
        let path = dir.join(name);
        self.export(&path).await?;
        prune_rotated(dir, retention)?;
        Ok(path)
    }

    async fn ensure_folder_path(
        &self,
        path: &str,
        cache: &mut HashMap<String, i64>,
        report: &mut ImportReport,
    ) -> Result<Option<i64>> {
        if path.is_empty() {
            return Ok(None);
        }
        if let Some(id) = cache.get(path) {
            return Ok(Some(*id));
        }

        let mut parent: Option<i64> = None;
        let mut walked = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !walked.is_empty() {
                walked.push('/');
            }
            walked.push_str(segment);

            let id = match cache.get(&walked) {
                Some(id) => *id,
                None => match self.folders.find_by_name_and_parent(segment, parent).await? {
                    Some(existing) => existing.id,
                    None => {
                        let created = self.folders.insert(segment, parent).await?;
                        report.folders_created += 1;
                        created.id
                    }
                },
            };
            cache.insert(walked.clone(), id);
            parent = Some(id);
        }
        Ok(parent)
    }

    async fn ensure_list(
        &self,
        folder_path: Option<&str>,
        name: &str,
        cache: &mut HashMap<String, i64>,
        report: &mut ImportReport,
    ) -> Result<i64> {
        let folder_id = match folder_path {
            Some(path) if !path.is_empty() => self.ensure_folder_path(path, cache, report).await?,
            _ => None,
        };
        match self.lists.find_by_name_and_folder(name, folder_id).await? {
            Some(existing) => Ok(existing.id),
            None => {
                let created = self.lists.insert(name, folder_id).await?;
                report.lists_created += 1;
                Ok(created.id)
            }
        }
    }

    async fn import_item(
        &self,
        record: &ItemRecord,
        cache: &mut HashMap<String, i64>,
        report: &mut ImportReport,
    ) -> Result<()> {
        let (folder_path, list_name) = match record.list_path.rsplit_once('/') {
            Some((prefix, name)) => (Some(prefix), name),
            None => (None, record.list_path.as_str()),
        };
        let list_id = self
            .ensure_list(folder_path, list_name, cache, report)
            .await?;

        let media_item_id = self.resolve_item(record, report).await?;
        if self.lists.find_item(list_id, media_item_id).await?.is_some() {
            report.items_skipped += 1;
            return Ok(());
        }
        ListRepositoryImpl::insert_item_in(
            self.db(),
            list_id,
            media_item_id,
            record.position,
        )
        .await?;
        report.items_added += 1;
        Ok(())
    }

    /// Identifier fallback chain: IMDb, TMDb, folded `(title, year)` against
    /// a single library item, plugin route, then a placeholder row.
    async fn resolve_item(&self, record: &ItemRecord, report: &mut ImportReport) -> Result<i64> {
        let media_type = MediaType::from_str(&record.media_type).unwrap_or(MediaType::External);

        if let Some(imdb) = record.imdb_id.as_deref().and_then(ImdbId::parse) {
            if let Some(mapping) = self.mappings.find_one_by_imdb(&imdb).await?
                && let Some(mapped_type) = MediaType::from_str(&mapping.media_type)
                && let Some(row) = self
                    .media
                    .find_by_type_and_host(mapped_type, mapping.host_library_id)
                    .await?
            {
                report.matches.exact_imdb += 1;
                return Ok(row.id);
            }
            if let Some(row) = self.media.find_by_imdb(imdb.as_str()).await?.into_iter().next() {
                report.matches.exact_imdb += 1;
                return Ok(row.id);
            }
            let row = self
                .placeholder(media_type, record, Some(imdb.as_str()))
                .await?;
            report.matches.placeholder += 1;
            return Ok(row.id);
        }

        if let Some(tmdb) = record.tmdb_id.as_deref() {
            let rows = self.media.find_by_tmdb(tmdb).await?;
            if let Some(row) = rows.into_iter().next() {
                report.matches.exact_tmdb += 1;
                return Ok(row.id);
            }
        }

        if let Some(year) = record.year {
            let folded = normalize::fold(&record.title);
            let candidates: Vec<MediaItemModel> = self
                .media
                .find_by_year(year)
                .await?
                .into_iter()
                .filter(|row| {
                    row.source == MediaSource::Lib.as_str()
                        && normalize::fold(&row.title) == folded
                })
                .collect();
            if candidates.len() == 1 {
                report.matches.title_year += 1;
                return Ok(candidates[0].id);
            }
        }

        if let Some(route) = record.plugin_route.as_deref()
            && let Some(row) = self.media.find_external_by_play_url(route).await?
        {
            report.matches.play_url += 1;
            return Ok(row.id);
        }

        let row = self.placeholder(media_type, record, None).await?;
        report.matches.placeholder += 1;
        Ok(row.id)
    }

    async fn placeholder(
        &self,
        media_type: MediaType,
        record: &ItemRecord,
        imdb_id: Option<&str>,
    ) -> Result<MediaItemModel> {
        // Re-imports reuse an identical placeholder instead of duplicating it.
        if let Some(existing) = self
            .media
            .find_external_by_identity(
                &record.title,
                record.year,
                record.plugin_route.as_deref(),
            )
            .await?
        {
            return Ok(existing);
        }
        debug!(title = %record.title, "Creating placeholder item");
        self.media
            .insert_external(
                media_type,
                &record.title,
                record.year,
                imdb_id,
                record.tmdb_id.as_deref(),
                record.plugin_route.as_deref(),
            )
            .await
    }

    fn db(&self) -> &sea_orm::DatabaseConnection {
        self.db.as_ref()
    }
}

fn item_record(list_path: &str, item: &MediaItemModel, position: i64) -> ItemRecord {
    let is_external = item.source == MediaSource::Ext.as_str();
    ItemRecord {
        schema_version: BACKUP_SCHEMA_VERSION,
        list_path: list_path.to_string(),
        media_type: item.media_type.clone(),
        imdb_id: item.imdb_id.clone(),
        tmdb_id: item.tmdb_id.clone(),
        title: item.title.clone(),
        year: item.year,
        show_imdb_id: None,
        season: None,
        episode: None,
        plugin_id: None,
        plugin_route: if is_external {
            item.play_url.clone()
        } else {
            None
        },
        position,
    }
}

/// `foo.ndjson` -> `foo.meta.json`
fn sidecar_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_string());
    path.with_file_name(format!("{stem}.meta.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;
    use crate::lists::ListManager;
    use crate::models::LightItem;

    async fn seed_library_movie(db: &DatabaseConnection, host_id: i64, title: &str, imdb: &str) {
        let item = LightItem {
            host_library_id: host_id,
            title: title.to_string(),
            year: Some(2020),
            imdb_id: Some(imdb.to_string()),
            ..Default::default()
        };
        MediaRepositoryImpl::upsert_light_in(db.as_ref(), MediaType::Movie, &item, 1)
            .await
            .unwrap();
        let mappings = MappingRepositoryImpl::new(db.clone());
        mappings
            .upsert(&ImdbId::parse(imdb).unwrap(), host_id, MediaType::Movie)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn round_trip_restores_hierarchy_and_membership() {
        let src_db = memory_db().await;
        seed_library_movie(&src_db, 1, "Movie", "tt9").await;
        let manager = ListManager::new(src_db.clone(), None);
        let folder = manager.create_folder("X", None).await.unwrap();
        let list = manager.create_list("L", Some(folder)).await.unwrap();
        let media = MediaRepositoryImpl::new(src_db.clone());
        let movie = media.find_by_imdb("tt9").await.unwrap().remove(0);
        manager.add_item(list, movie.id).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.ndjson");
        let engine = BackupEngine::new(src_db.clone());
        let meta = engine.export(&path).await.unwrap();
        // X plus the reserved Search History folder.
        assert_eq!(meta.counts.folders, 2);
        // Favorites (bootstrap) plus L.
        assert_eq!(meta.counts.lists, 2);
        assert_eq!(meta.counts.items, 1);
        assert!(path.with_file_name("export.meta.json").exists());

        // Import into an empty store that still knows the library item.
        let dst_db = memory_db().await;
        seed_library_movie(&dst_db, 1, "Movie", "tt9").await;
        let engine = BackupEngine::new(dst_db.clone());
        let report = engine.import(&path).await.unwrap();
        assert_eq!(report.folders_created, 1);
        assert_eq!(report.items_added, 1);
        assert_eq!(report.matches.exact_imdb, 1);
        assert_eq!(report.matches.placeholder, 0);

        let manager = ListManager::new(dst_db.clone(), None);
        let restored_folder = manager.subfolders(None).await.unwrap();
        assert!(restored_folder.iter().any(|f| f.name == "X"));
        let folder_id = restored_folder.iter().find(|f| f.name == "X").unwrap().id;
        let lists = manager.lists_in_folder(Some(folder_id)).await.unwrap();
        assert_eq!(lists.len(), 1);
        let items = manager.items(lists[0].id).await.unwrap();
        assert_eq!(items.len(), 1);

        let row = MediaRepositoryImpl::new(dst_db.clone())
            .find_by_id(items[0].media_item_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.imdb_id.as_deref(), Some("tt9"));
    }

    #[tokio::test]
    async fn import_without_library_creates_placeholder() {
        let src_db = memory_db().await;
        seed_library_movie(&src_db, 1, "Movie", "tt9").await;
        let manager = ListManager::new(src_db.clone(), None);
        let list = manager.create_list("L", None).await.unwrap();
        let media = MediaRepositoryImpl::new(src_db.clone());
        let movie = media.find_by_imdb("tt9").await.unwrap().remove(0);
        manager.add_item(list, movie.id).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.ndjson");
        BackupEngine::new(src_db).export(&path).await.unwrap();

        let dst_db = memory_db().await;
        let report = BackupEngine::new(dst_db.clone())
            .import(&path)
            .await
            .unwrap();
        assert_eq!(report.matches.placeholder, 1);

        let placeholder = MediaRepositoryImpl::new(dst_db)
            .find_by_imdb("tt9")
            .await
            .unwrap();
        assert_eq!(placeholder.len(), 1);
        assert_eq!(placeholder[0].source, MediaSource::Ext.as_str());
    }

    #[tokio::test]
    async fn double_import_is_idempotent() {
        let src_db = memory_db().await;
        let manager = ListManager::new(src_db.clone(), None);
        let folder = manager.create_folder("X", None).await.unwrap();
        manager.create_list("L", Some(folder)).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.ndjson");
        BackupEngine::new(src_db).export(&path).await.unwrap();

        let dst_db = memory_db().await;
        let engine = BackupEngine::new(dst_db.clone());
        engine.import(&path).await.unwrap();
        let second = engine.import(&path).await.unwrap();
        assert_eq!(second.folders_created, 0);
        assert_eq!(second.lists_created, 0);

        let manager = ListManager::new(dst_db, None);
        let folders: Vec<_> = manager
            .subfolders(None)
            .await
            .unwrap()
            .into_iter()
            .filter(|f| f.name == "X")
            .collect();
        assert_eq!(folders.len(), 1);
        assert_eq!(
            manager
                .lists_in_folder(Some(folders[0].id))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn unknown_records_and_garbage_lines_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.ndjson");
        fs::write(
            &path,
            concat!(
                r#"{"record_type":"hologram","schema_version":2}"#,
                "\n",
                "not json at all\n",
                r#"{"record_type":"list","schema_version":1,"name":"Kept","created_at":"2026-01-01T00:00:00Z"}"#,
                "\n",
            ),
        )
        .unwrap();

        let db = memory_db().await;
        let report = BackupEngine::new(db.clone()).import(&path).await.unwrap();
        assert_eq!(report.unknown_records, 1);
        assert_eq!(report.malformed_lines, 1);
        assert_eq!(report.lists_created, 1);
    }

    #[tokio::test]
    async fn rotation_prunes_oldest_first() {
        let db = memory_db().await;
        let dir = tempfile::tempdir().unwrap();
        for stamp in ["20260101-000000", "20260102-000000", "20260103-000000"] {
            let name = format!("{BACKUP_FILE_PREFIX}{stamp}.ndjson");
            fs::write(dir.path().join(name), "").unwrap();
        }

        let engine = BackupEngine::new(db);
        engine.run_rotation(dir.path(), 2).await.unwrap();

        let mut kept: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".ndjson"))
            .collect();
        kept.sort();
        assert_eq!(kept.len(), 2);
        assert!(!kept.iter().any(|n| n.contains("20260101")));
        assert!(!kept.iter().any(|n| n.contains("20260102")));
    }
}

fn prune_rotated(dir: &Path, retention: usize) -> Result<()> {
    let mut rotated: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read backup directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(BACKUP_FILE_PREFIX) && n.ends_with(".ndjson"))
                .unwrap_or(false)
        })
        .collect();
    // Timestamped names sort chronologically.
    rotated.sort();
    if rotated.len() <= retention {
        return Ok(());
    }
    let excess = rotated.len() - retention;
    for path in rotated.into_iter().take(excess) {
        info!(path = %path.display(), "Pruning rotated backup");
        let _ = fs::remove_file(sidecar_path(&path));
        fs::remove_file(&path)
            .with_context(|| format!("Failed to prune {}", path.display()))?;
    }
    Ok(())
}
