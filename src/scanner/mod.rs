//! Ingest pipeline: populates the index with light metadata from the library
//! provider, maintains the IMDb-to-host mapping, and caches heavy metadata.

use anyhow::{Context, Result, anyhow};
use sea_orm::TransactionTrait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::DatabaseConnection;
use crate::db::repository::mapping_repository::MappingRepositoryImpl;
use crate::db::repository::media_repository::{
    MediaRepository, MediaRepositoryImpl, UpsertOutcome,
};
use crate::db::repository::scan_repository::ScanRepositoryImpl;
use crate::models::{ExtendedBag, ImdbId, LightItem, MediaType, ScanType};
use crate::provider::LibraryProvider;

/// Provider pages are retried this many times before a scan fails.
const PAGE_RETRY_ATTEMPTS: u32 = 3;
const PAGE_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Scan progress, also the shape of the terminal state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Fetching,
    Upserting,
    Sweeping,
    Logging,
    Failed,
}

/// Counts reported after a scan; mirrors the persisted scan log row.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub scan_id: i64,
    pub items_added: usize,
    pub items_updated: usize,
    pub items_removed: usize,
}

pub struct Scanner {
    db: DatabaseConnection,
    provider: Arc<dyn LibraryProvider>,
    page_size: u64,
    abort: CancellationToken,
    phase: std::sync::Mutex<ScanPhase>,
}

impl Scanner {
    pub fn new(
        db: DatabaseConnection,
        provider: Arc<dyn LibraryProvider>,
        page_size: u64,
        abort: CancellationToken,
    ) -> Self {
        Self {
            db,
            provider,
            page_size,
            abort,
            phase: std::sync::Mutex::new(ScanPhase::Idle),
        }
    }

    /// Current phase of the in-flight scan, `Idle` between scans and `Failed`
    /// after an aborted one.
    pub fn phase(&self) -> ScanPhase {
        *self.phase.lock().unwrap()
    }

    fn set_phase(&self, phase: ScanPhase) {
        *self.phase.lock().unwrap() = phase;
    }

    /// Authoritative reconciliation: fetch every page, upsert, sweep rows the
    /// provider no longer reports, rebuild the IMDb mapping, log.
    ///
    /// The sweep only runs when every page committed; a failed or aborted
    /// scan keeps its committed pages and skips sweep and remap.
    pub async fn full_scan(&self, media_types: &[MediaType]) -> Result<ScanSummary> {
        let host_version = self.provider.version().await.ok();
        let scans = ScanRepositoryImpl::new(self.db.clone());
        let log = scans.start(ScanType::Full, host_version).await?;
        let scan_id = log.id;
        info!(scan_id, ?media_types, "Starting full scan");

        let mut summary = ScanSummary {
            scan_id,
            ..Default::default()
        };

        for media_type in media_types {
            if let Err(e) = self
                .ingest_all_pages(*media_type, scan_id, &mut summary)
                .await
            {
                self.set_phase(ScanPhase::Failed);
                let message = format!("{media_type}: {e:#}");
                warn!(scan_id, "Full scan failed: {message}");
                scans
                    .finish(
                        scan_id,
                        summary.items_added as i32,
                        summary.items_updated as i32,
                        summary.items_removed as i32,
                        Some(&message),
                        None,
                    )
                    .await?;
                return Err(e);
            }
        }

        self.set_phase(ScanPhase::Sweeping);
        let media = MediaRepositoryImpl::new(self.db.clone());
        let removed = media.sweep_not_seen(media_types, scan_id).await?;
        summary.items_removed = removed as usize;

        self.rebuild_mapping(media_types).await?;

        self.set_phase(ScanPhase::Logging);
        let token = self.provider.change_token().await.unwrap_or(None);
        scans
            .finish(
                scan_id,
                summary.items_added as i32,
                summary.items_updated as i32,
                summary.items_removed as i32,
                None,
                token.as_deref(),
            )
            .await?;

        self.set_phase(ScanPhase::Idle);
        info!(
            scan_id,
            added = summary.items_added,
            updated = summary.items_updated,
            removed = summary.items_removed,
            "Full scan complete"
        );
        Ok(summary)
    }

    /// Incremental ingest. Uses the provider change token when supported;
    /// otherwise compares per-page fingerprints. Deletions are applied only
    /// when the provider reports them explicitly.
    pub async fn delta_scan(&self, media_types: &[MediaType]) -> Result<ScanSummary> {
        let host_version = self.provider.version().await.ok();
        let scans = ScanRepositoryImpl::new(self.db.clone());
        let log = scans.start(ScanType::Delta, host_version).await?;
        let scan_id = log.id;
        info!(scan_id, ?media_types, "Starting delta scan");

        let since_token = scans.last_change_token().await?;
        let mut summary = ScanSummary {
            scan_id,
            ..Default::default()
        };
        let mut next_token: Option<String> = None;

        let result = self
            .ingest_delta(media_types, scan_id, since_token, &mut summary, &mut next_token)
            .await;

        match result {
            Ok(()) => {
                self.set_phase(ScanPhase::Logging);
                scans
                    .finish(
                        scan_id,
                        summary.items_added as i32,
                        summary.items_updated as i32,
                        summary.items_removed as i32,
                        None,
                        next_token.as_deref(),
                    )
                    .await?;
                self.set_phase(ScanPhase::Idle);
                info!(
                    scan_id,
                    added = summary.items_added,
                    updated = summary.items_updated,
                    removed = summary.items_removed,
                    "Delta scan complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.set_phase(ScanPhase::Failed);
                let message = format!("{e:#}");
                warn!(scan_id, "Delta scan failed: {message}");
                scans
                    .finish(
                        scan_id,
                        summary.items_added as i32,
                        summary.items_updated as i32,
                        summary.items_removed as i32,
                        Some(&message),
                        None,
                    )
                    .await?;
                Err(e)
            }
        }
    }

    /// Force a full scan when the host major version changed since the last
    /// recorded scan. Returns the summary when a scan ran.
    pub async fn version_migrate(&self, media_types: &[MediaType]) -> Result<Option<ScanSummary>> {
        let scans = ScanRepositoryImpl::new(self.db.clone());
        let previous = scans.last_successful_host_version().await?;
        let current = self.provider.version().await?;
        match previous {
            Some(prev) if prev == current => Ok(None),
            Some(prev) => {
                info!(prev, current, "Host version changed, forcing full scan");
                self.full_scan(media_types).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Heavy-metadata bag for one library item, fetched from the provider on
    /// cache miss.
    pub async fn get_heavy(
        &self,
        media_type: MediaType,
        host_library_id: i64,
    ) -> Result<ExtendedBag> {
        let media = MediaRepositoryImpl::new(self.db.clone());
        if let Some(cached) = media.find_details(media_type, host_library_id).await? {
            return Ok(ExtendedBag(cached.details));
        }
        let bag = self
            .provider
            .get_extended(media_type, host_library_id)
            .await
            .context("Provider extended-metadata fetch failed")?;
        media
            .save_details(media_type, host_library_id, bag.0.clone())
            .await?;
        Ok(bag)
    }

    async fn ingest_all_pages(
        &self,
        media_type: MediaType,
        scan_id: i64,
        summary: &mut ScanSummary,
    ) -> Result<()> {
        let mut cursor: Option<String> = None;
        loop {
            if self.abort.is_cancelled() {
                return Err(anyhow!("scan aborted"));
            }

            self.set_phase(ScanPhase::Fetching);
            let page = self
                .fetch_page_with_retry(media_type, cursor.as_deref())
                .await?;

            self.set_phase(ScanPhase::Upserting);
            self.upsert_page(media_type, &page.items, scan_id, summary)
                .await?;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }

    /// One page per transaction; a failed page rolls back atomically.
    async fn upsert_page(
        &self,
        media_type: MediaType,
        items: &[LightItem],
        scan_id: i64,
        summary: &mut ScanSummary,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin().await?;
        for item in items {
            match MediaRepositoryImpl::upsert_light_in(&txn, media_type, item, scan_id).await? {
                UpsertOutcome::Added => summary.items_added += 1,
                UpsertOutcome::Updated => summary.items_updated += 1,
                UpsertOutcome::Unchanged => {}
            }
        }
        txn.commit().await?;
        debug!(
            media_type = %media_type,
            count = items.len(),
            "Committed page"
        );
        Ok(())
    }

    async fn ingest_delta(
        &self,
        media_types: &[MediaType],
        scan_id: i64,
        since_token: Option<String>,
        summary: &mut ScanSummary,
        next_token: &mut Option<String>,
    ) -> Result<()> {
        let media = MediaRepositoryImpl::new(self.db.clone());
        let mappings = MappingRepositoryImpl::new(self.db.clone());

        for media_type in media_types {
            if self.abort.is_cancelled() {
                return Err(anyhow!("scan aborted"));
            }

            let changes = match &since_token {
                Some(token) => self.provider.list_changes(*media_type, token).await?,
                None => None,
            };

            match changes {
                Some(delta) => {
                    self.upsert_page(*media_type, &delta.changed, scan_id, summary)
                        .await?;
                    for item in &delta.changed {
                        if let Some(imdb) = item.imdb_id.as_deref().and_then(ImdbId::parse) {
                            mappings
                                .upsert(&imdb, item.host_library_id, *media_type)
                                .await?;
                        }
                    }
                    for host_id in &delta.removed {
                        let removed = media.delete_library_row(*media_type, *host_id).await?;
                        summary.items_removed += removed as usize;
                    }
                    *next_token = Some(delta.next_token);
                }
                None => {
                    // Fingerprint fallback: walk every page, apply changes,
                    // never delete.
                    self.fingerprint_pass(*media_type, scan_id, summary).await?;
                    *next_token = self.provider.change_token().await.unwrap_or(None);
                }
            }
        }
        Ok(())
    }

    async fn fingerprint_pass(
        &self,
        media_type: MediaType,
        scan_id: i64,
        summary: &mut ScanSummary,
    ) -> Result<()> {
        let media = MediaRepositoryImpl::new(self.db.clone());
        let existing: HashMap<i64, LightItem> = media
            .find_library_items(media_type)
            .await?
            .into_iter()
            .filter_map(|row| row.host_library_id.map(|id| (id, row.to_light())))
            .collect();

        let mut cursor: Option<String> = None;
        loop {
            if self.abort.is_cancelled() {
                return Err(anyhow!("scan aborted"));
            }
            let page = self
                .fetch_page_with_retry(media_type, cursor.as_deref())
                .await?;

            let changed: Vec<LightItem> = page
                .items
                .iter()
                .filter(|item| {
                    existing
                        .get(&item.host_library_id)
                        .map(|old| old.fingerprint() != item.fingerprint())
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            self.upsert_page(media_type, &changed, scan_id, summary)
                .await?;

            let mappings = MappingRepositoryImpl::new(self.db.clone());
            for item in &changed {
                if let Some(imdb) = item.imdb_id.as_deref().and_then(ImdbId::parse) {
                    mappings
                        .upsert(&imdb, item.host_library_id, media_type)
                        .await?;
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }

    async fn fetch_page_with_retry(
        &self,
        media_type: MediaType,
        cursor: Option<&str>,
    ) -> Result<crate::provider::ProviderPage> {
        let mut last_error = None;
        for attempt in 0..=PAGE_RETRY_ATTEMPTS {
            if attempt > 0 {
                let delay = PAGE_RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                debug!(
                    media_type = %media_type,
                    attempt,
                    ?delay,
                    "Retrying provider page"
                );
                sleep(delay).await;
            }
            match self.provider.list(media_type, cursor, self.page_size).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!(media_type = %media_type, attempt, "Provider page failed: {e:#}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("provider page fetch failed")))
    }

    /// Rebuild `imdb_mappings` from the surviving library rows, atomically.
    async fn rebuild_mapping(&self, media_types: &[MediaType]) -> Result<()> {
        let media = MediaRepositoryImpl::new(self.db.clone());
        let mut entries = Vec::new();
        for media_type in media_types {
            for row in media.find_library_items(*media_type).await? {
                if let (Some(imdb), Some(host_id)) = (
                    row.imdb_id.as_deref().and_then(ImdbId::parse),
                    row.host_library_id,
                ) {
                    entries.push((imdb, host_id, *media_type));
                }
            }
        }
        let txn = self.db.begin().await?;
        MappingRepositoryImpl::rebuild_in(&txn, &entries).await?;
        txn.commit().await?;
        debug!(count = entries.len(), "Rebuilt IMDb mapping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::Repository;
    use crate::db::test_support::memory_db;
    use crate::models::MediaSource;
    use crate::provider::MemoryProvider;

    fn movie(host_id: i64, title: &str, imdb: Option<&str>) -> LightItem {
        LightItem {
            host_library_id: host_id,
            title: title.to_string(),
            year: Some(2008),
            imdb_id: imdb.map(str::to_string),
            duration_seconds: Some(7200),
            ..Default::default()
        }
    }

    fn scanner(db: &DatabaseConnection, provider: Arc<MemoryProvider>) -> Scanner {
        Scanner::new(db.clone(), provider, 200, CancellationToken::new())
    }

    #[tokio::test]
    async fn full_scan_is_idempotent() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        provider.set_items(
            MediaType::Movie,
            vec![movie(1, "A", Some("tt1")), movie(2, "B", Some("tt2"))],
        );

        let scanner = scanner(&db, provider.clone());
        let first = scanner.full_scan(&[MediaType::Movie]).await.unwrap();
        assert_eq!(first.items_added, 2);
        assert_eq!(first.items_removed, 0);

        let second = scanner.full_scan(&[MediaType::Movie]).await.unwrap();
        assert_eq!(second.items_added, 0);
        assert_eq!(second.items_updated, 0);
        assert_eq!(second.items_removed, 0);

        let media = MediaRepositoryImpl::new(db.clone());
        assert_eq!(media.count().await.unwrap(), 2);
        let mappings = MappingRepositoryImpl::new(db.clone());
        assert_eq!(mappings.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sweep_removes_vanished_library_rows_only() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        provider.set_items(
            MediaType::Movie,
            vec![movie(1, "A", Some("tt1")), movie(2, "B", Some("tt2"))],
        );

        let scanner = scanner(&db, provider.clone());
        scanner.full_scan(&[MediaType::Movie]).await.unwrap();

        // An externally-owned row must survive any sweep.
        let media = MediaRepositoryImpl::new(db.clone());
        media
            .insert_external(
                MediaType::External,
                "Plugin Thing",
                Some(2020),
                None,
                None,
                Some("plugin://thing"),
            )
            .await
            .unwrap();

        provider.set_items(MediaType::Movie, vec![movie(1, "A", Some("tt1"))]);
        let summary = scanner.full_scan(&[MediaType::Movie]).await.unwrap();
        assert_eq!(summary.items_removed, 1);

        let remaining = media.find_all().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(
            remaining
                .iter()
                .any(|row| row.source == MediaSource::Ext.as_str())
        );
    }

    #[tokio::test]
    async fn failed_page_aborts_without_sweeping() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        provider.set_items(
            MediaType::Movie,
            vec![movie(1, "A", Some("tt1")), movie(2, "B", Some("tt2"))],
        );

        let scanner = scanner(&db, provider.clone());
        scanner.full_scan(&[MediaType::Movie]).await.unwrap();

        // Shrink the library then make every retry fail: committed rows stay.
        provider.set_items(MediaType::Movie, vec![movie(1, "A", Some("tt1"))]);
        provider.fail_next_pages(PAGE_RETRY_ATTEMPTS + 1);
        assert!(scanner.full_scan(&[MediaType::Movie]).await.is_err());

        let media = MediaRepositoryImpl::new(db.clone());
        assert_eq!(media.count().await.unwrap(), 2);

        let scans = ScanRepositoryImpl::new(db.clone());
        let log = scans.latest().await.unwrap().unwrap();
        assert!(log.error.is_some());
    }

    #[tokio::test]
    async fn update_detected_by_fingerprint() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        provider.set_items(MediaType::Movie, vec![movie(1, "A", Some("tt1"))]);

        let scanner = scanner(&db, provider.clone());
        scanner.full_scan(&[MediaType::Movie]).await.unwrap();

        provider.set_items(MediaType::Movie, vec![movie(1, "A (Remastered)", Some("tt1"))]);
        let summary = scanner.full_scan(&[MediaType::Movie]).await.unwrap();
        assert_eq!(summary.items_updated, 1);
        assert_eq!(summary.items_added, 0);
    }

    #[tokio::test]
    async fn delta_scan_applies_explicit_removals() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        provider.set_items(
            MediaType::Movie,
            vec![movie(1, "A", Some("tt1")), movie(2, "B", Some("tt2"))],
        );
        provider.set_change_token("t1");

        let scanner = scanner(&db, provider.clone());
        scanner.full_scan(&[MediaType::Movie]).await.unwrap();

        provider.set_items(MediaType::Movie, vec![movie(1, "A", Some("tt1"))]);
        provider.mark_removed(MediaType::Movie, &[2]);
        provider.set_change_token("t2");

        let summary = scanner.delta_scan(&[MediaType::Movie]).await.unwrap();
        assert_eq!(summary.items_removed, 1);

        let media = MediaRepositoryImpl::new(db.clone());
        assert_eq!(media.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn version_change_forces_full_scan() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        provider.set_items(MediaType::Movie, vec![movie(1, "A", Some("tt1"))]);
        provider.set_version(19);

        let scanner = scanner(&db, provider.clone());
        scanner.full_scan(&[MediaType::Movie]).await.unwrap();

        // Same version: nothing to do.
        assert!(
            scanner
                .version_migrate(&[MediaType::Movie])
                .await
                .unwrap()
                .is_none()
        );

        provider.set_version(20);
        let migrated = scanner.version_migrate(&[MediaType::Movie]).await.unwrap();
        assert!(migrated.is_some());
    }

    #[tokio::test]
    async fn heavy_bag_cached_after_first_fetch() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        provider.set_items(MediaType::Movie, vec![movie(1, "A", Some("tt1"))]);
        provider.set_extended(
            MediaType::Movie,
            1,
            serde_json::json!({"cast": [{"name": "Christian Bale"}]}),
        );

        let scanner = scanner(&db, provider.clone());
        scanner.full_scan(&[MediaType::Movie]).await.unwrap();

        let bag = scanner.get_heavy(MediaType::Movie, 1).await.unwrap();
        assert!(bag.0.get("cast").is_some());

        // Second read hits the cache even if the provider forgets the item.
        provider.set_extended(MediaType::Movie, 1, serde_json::json!({}));
        let cached = scanner.get_heavy(MediaType::Movie, 1).await.unwrap();
        assert!(cached.0.get("cast").is_some());
    }
}
