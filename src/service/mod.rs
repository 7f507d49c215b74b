//! Cooperative background loop driving scans, reconciliation, token refresh,
//! and backup rotation.
//!
//! One long-lived task with short ticks; heavy work runs behind a
//! process-wide lock, defers to playback, and observes the shutdown token
//! between steps so the loop exits within a tick of cancellation.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::AuthManager;
use crate::backup::BackupEngine;
use crate::config::Config;
use crate::constants::SERVICE_TICK;
use crate::db::DatabaseConnection;
use crate::db::repository::scan_repository::ScanRepositoryImpl;
use crate::models::MediaType;
use crate::provider::LibraryProvider;
use crate::scanner::Scanner;
use crate::sync::{CycleError, SyncApi, SyncReconciler};

/// Ticks between idle token-refresh checks (~15 s at the default tick).
const REFRESH_CHECK_TICKS: u32 = 100;

pub struct Service {
    config: Config,
    provider: Arc<dyn LibraryProvider>,
    scanner: Scanner,
    reconciler: SyncReconciler,
    auth: AuthManager,
    backup: BackupEngine,
    scans: ScanRepositoryImpl,
    /// Serializes heavy work: one scan-or-sync at a time, no reentrancy.
    sync_lock: Arc<Mutex<()>>,
    shutdown: CancellationToken,
}

impl Service {
    pub fn new(
        db: DatabaseConnection,
        config: Config,
        provider: Arc<dyn LibraryProvider>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let scanner = Scanner::new(
            db.clone(),
            provider.clone(),
            config.scan.page_size,
            shutdown.clone(),
        );
        let reconciler = SyncReconciler::new(
            db.clone(),
            config.effective_chunk_size(),
            config.sync.max_retries,
        );
        let auth = AuthManager::new(db.clone())?;
        let backup = BackupEngine::new(db.clone());
        let scans = ScanRepositoryImpl::new(db);
        Ok(Self {
            config,
            provider,
            scanner,
            reconciler,
            auth,
            backup,
            scans,
            sync_lock: Arc::new(Mutex::new(())),
            shutdown,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the shutdown token fires.
    pub async fn run(&self) -> Result<()> {
        let cycle_every = Duration::from_secs(self.config.effective_interval_minutes() * 60);
        let idle_grace = Duration::from_secs(self.config.service.idle_grace_seconds);
        let mut interval = tokio::time::interval(SERVICE_TICK);
        let mut last_cycle: Option<Instant> = None;
        let mut last_playback: Option<Instant> = None;
        let mut tick: u32 = 0;

        info!(
            interval_minutes = self.config.effective_interval_minutes(),
            "Background service started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Background service stopping");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }

            tick = tick.wrapping_add(1);
            if tick % REFRESH_CHECK_TICKS == 0
                && let Err(e) = self.auth.ensure_fresh().await
            {
                warn!("Token refresh check failed: {e:#}");
            }

            if self.provider.is_playing().await {
                last_playback = Some(Instant::now());
                continue;
            }
            if let Some(stopped) = last_playback
                && stopped.elapsed() < idle_grace
            {
                continue;
            }

            let due = last_cycle
                .map(|at| at.elapsed() >= cycle_every)
                .unwrap_or(true);
            if !due {
                continue;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Background service stopping mid-cycle");
                    return Ok(());
                }
                _ = self.run_cycle() => {}
            }
            last_cycle = Some(Instant::now());
        }
    }

    /// One full housekeeping cycle: scan, reconcile, rotate. Failures log
    /// and leave the remaining steps to the next cycle.
    pub async fn run_cycle(&self) {
        let Ok(_guard) = self.sync_lock.try_lock() else {
            debug!("Cycle already in progress, skipping");
            return;
        };

        if let Err(e) = self.run_scan_step().await {
            warn!("Scan step failed: {e:#}");
        }
        if self.shutdown.is_cancelled() {
            return;
        }
        if self.config.sync.enabled
            && let Err(e) = self.run_sync_step().await
        {
            warn!("Sync step failed: {e:#}");
        }
        if self.shutdown.is_cancelled() {
            return;
        }
        if let Err(e) = self.run_backup_step().await {
            warn!("Backup rotation failed: {e:#}");
        }
    }

    fn scan_types(&self) -> Vec<MediaType> {
        let mut types = vec![MediaType::Movie];
        if self.config.scan.tv_episodes_enabled {
            types.push(MediaType::Episode);
        }
        types
    }

    async fn run_scan_step(&self) -> Result<()> {
        let types = self.scan_types();
        if self.scanner.version_migrate(&types).await?.is_some() {
            return Ok(());
        }
        if self.scans.latest().await?.is_none() {
            self.scanner.full_scan(&types).await?;
        } else {
            self.scanner.delta_scan(&types).await?;
        }
        Ok(())
    }

    async fn run_sync_step(&self) -> Result<()> {
        let Some(creds) = self.auth.ensure_fresh().await? else {
            debug!("Sync enabled but not paired, skipping");
            return Ok(());
        };
        let api = SyncApi::new(&creds.server_url, &creds.token_type, &creds.access_token)
            .map_err(|e| anyhow::anyhow!(e))?;
        match self.reconciler.run_cycle(&api).await {
            Ok(outcome) => {
                debug!(?outcome, "Sync cycle finished");
                Ok(())
            }
            Err(CycleError::Auth) => {
                // Refresh now; the next cycle resumes with fresh credentials.
                warn!("Sync cycle hit authorization failure, refreshing token");
                self.auth.ensure_fresh().await?;
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    }

    async fn run_backup_step(&self) -> Result<()> {
        let Some(root) = self.config.backup.path.as_deref() else {
            return Ok(());
        };
        let dir = PathBuf::from(root);
        self.backup
            .run_rotation(&dir, self.config.backup.retention_count)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;
    use crate::models::LightItem;
    use crate::provider::MemoryProvider;

    fn movie(host_id: i64, title: &str) -> LightItem {
        LightItem {
            host_library_id: host_id,
            title: title.to_string(),
            imdb_id: Some(format!("tt{host_id}")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn cycle_scans_when_due() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        provider.set_items(MediaType::Movie, vec![movie(1, "A"), movie(2, "B")]);

        let service = Service::new(
            db.clone(),
            Config::default(),
            provider,
            CancellationToken::new(),
        )
        .unwrap();
        service.run_cycle().await;

        let scans = ScanRepositoryImpl::new(db);
        let log = scans.latest().await.unwrap().unwrap();
        assert!(log.error.is_none());
        assert_eq!(log.items_added, 2);
    }

    #[tokio::test]
    async fn shutdown_observed_within_a_tick() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        let shutdown = CancellationToken::new();
        let service =
            Service::new(db, Config::default(), provider, shutdown.clone()).unwrap();

        let handle = tokio::spawn(async move { service.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let finished = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(finished.is_ok());
    }

    #[tokio::test]
    async fn playback_defers_heavy_work() {
        let db = memory_db().await;
        let provider = Arc::new(MemoryProvider::new());
        provider.set_items(MediaType::Movie, vec![movie(1, "A")]);
        provider.set_playing(true);
        let shutdown = CancellationToken::new();
        let service = Service::new(
            db.clone(),
            Config::default(),
            provider.clone(),
            shutdown.clone(),
        )
        .unwrap();

        let handle = tokio::spawn(async move { service.run().await });
        tokio::time::sleep(Duration::from_millis(400)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        // No scan ran while playing.
        let scans = ScanRepositoryImpl::new(db);
        assert!(scans.latest().await.unwrap().is_none());
    }
}
