//! Shared defaults for scanning, syncing, and the background service.

use std::time::Duration;

/// Provider page size used when fetching light metadata.
pub const DEFAULT_SCAN_PAGE_SIZE: u64 = 200;

/// Maximum IMDb ids per add/remove request to the remote.
pub const DEFAULT_SYNC_CHUNK_SIZE: usize = 5_000;
pub const MAX_SYNC_CHUNK_SIZE: usize = 10_000;

/// Consecutive failures before a sync cycle is abandoned.
pub const DEFAULT_SYNC_MAX_RETRIES: u32 = 5;

/// Minutes between background cycles.
pub const DEFAULT_SERVICE_INTERVAL_MINUTES: u64 = 60;
pub const MIN_SERVICE_INTERVAL_MINUTES: u64 = 5;
pub const MAX_SERVICE_INTERVAL_MINUTES: u64 = 720;

/// Seconds of idle required after playback stops before heavy work resumes.
pub const DEFAULT_IDLE_GRACE_SECONDS: u64 = 30;

/// Rotated backups kept before pruning oldest-first.
pub const DEFAULT_BACKUP_RETENTION: usize = 10;

/// Background service tick.
pub const SERVICE_TICK: Duration = Duration::from_millis(150);

/// Provider fetch timeout.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote HTTP timeouts.
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const HTTP_TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens are refreshed when expiry falls within this window.
pub const TOKEN_REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Reserved root folder auto-populated by the search engine.
pub const SEARCH_HISTORY_FOLDER: &str = "Search History";

/// Well-known list created at bootstrap, default quick-add target.
pub const FAVORITES_LIST: &str = "Favorites";

/// NDJSON backup schema version.
pub const BACKUP_SCHEMA_VERSION: u32 = 1;

/// Prefix for rotated backup files.
pub const BACKUP_FILE_PREFIX: &str = "librarian-backup-";
