use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::constants::{
    DEFAULT_BACKUP_RETENTION, DEFAULT_IDLE_GRACE_SECONDS, DEFAULT_SCAN_PAGE_SIZE,
    DEFAULT_SERVICE_INTERVAL_MINUTES, DEFAULT_SYNC_CHUNK_SIZE, DEFAULT_SYNC_MAX_RETRIES,
    MAX_SERVICE_INTERVAL_MINUTES, MAX_SYNC_CHUNK_SIZE, MIN_SERVICE_INTERVAL_MINUTES,
};
use crate::models::{SearchMatch, SearchScope};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub lists: ListsConfig,

    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    #[serde(default)]
    pub tv_episodes_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    #[serde(default = "default_idle_grace")]
    pub idle_grace_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Filesystem or network-share root for rotated backups. Rotation is
    /// disabled while unset.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_retention")]
    pub retention_count: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: None,
            retention_count: default_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub default_scope: SearchScope,

    #[serde(default)]
    pub default_match: SearchMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListsConfig {
    /// Preferred quick-add target; Favorites is used when unset.
    #[serde(default)]
    pub quick_add_list_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteConfig {
    /// Pairing endpoint root, used before any token is stored.
    #[serde(default)]
    pub server_url: Option<String>,
}

fn default_page_size() -> u64 {
    DEFAULT_SCAN_PAGE_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_SYNC_CHUNK_SIZE
}

fn default_max_retries() -> u32 {
    DEFAULT_SYNC_MAX_RETRIES
}

fn default_interval_minutes() -> u64 {
    DEFAULT_SERVICE_INTERVAL_MINUTES
}

fn default_idle_grace() -> u64 {
    DEFAULT_IDLE_GRACE_SECONDS
}

fn default_retention() -> usize {
    DEFAULT_BACKUP_RETENTION
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            tv_episodes_enabled: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            idle_grace_seconds: default_idle_grace(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            debug!("Loading config from {:?}", config_path);
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", config_path);
        Ok(())
    }

    /// Chunk size honoring the protocol maximum.
    pub fn effective_chunk_size(&self) -> usize {
        self.sync.chunk_size.min(MAX_SYNC_CHUNK_SIZE)
    }

    /// Cycle interval clamped to the supported range.
    pub fn effective_interval_minutes(&self) -> u64 {
        self.service
            .interval_minutes
            .clamp(MIN_SERVICE_INTERVAL_MINUTES, MAX_SERVICE_INTERVAL_MINUTES)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("librarian").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.scan.page_size, 200);
        assert!(!config.scan.tv_episodes_enabled);
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.chunk_size, 5_000);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.service.interval_minutes, 60);
        assert_eq!(config.service.idle_grace_seconds, 30);
        assert_eq!(config.backup.retention_count, 10);
        assert_eq!(config.search.default_scope, SearchScope::Both);
        assert_eq!(config.search.default_match, SearchMatch::All);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let mut config = Config::default();
        config.sync.chunk_size = 50_000;
        assert_eq!(config.effective_chunk_size(), 10_000);
        config.service.interval_minutes = 1;
        assert_eq!(config.effective_interval_minutes(), 5);
        config.service.interval_minutes = 10_000;
        assert_eq!(config.effective_interval_minutes(), 720);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [sync]
            enabled = true

            [search]
            default_scope = "title"
            default_match = "any"
            "#,
        )
        .unwrap();
        assert!(config.sync.enabled);
        assert_eq!(config.sync.chunk_size, 5_000);
        assert_eq!(config.search.default_scope, SearchScope::Title);
        assert_eq!(config.search.default_match, SearchMatch::Any);
    }
}
