use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ExtendedBag, LightItem, MediaType};

/// One page of light-property items from the host library.
#[derive(Debug, Clone, Default)]
pub struct ProviderPage {
    pub items: Vec<LightItem>,
    pub next_cursor: Option<String>,
}

/// Changes reported by a provider that supports change tokens.
#[derive(Debug, Clone)]
pub struct ProviderChanges {
    /// Inserted or updated items, light properties only.
    pub changed: Vec<LightItem>,
    /// Host library ids the provider explicitly marks removed.
    pub removed: Vec<i64>,
    /// Token to persist for the next delta scan.
    pub next_token: String,
}

/// Abstract source of library items. The engine is agnostic to transport:
/// JSON-RPC, direct DB, or the in-memory fake used by tests.
#[async_trait]
pub trait LibraryProvider: Send + Sync + std::fmt::Debug {
    /// Fetch one page of light-property items. `cursor = None` starts from
    /// the beginning; a `None` next_cursor ends the scan.
    async fn list(
        &self,
        media_type: MediaType,
        cursor: Option<&str>,
        page_size: u64,
    ) -> Result<ProviderPage>;

    /// Changes since `since_token`, or `Ok(None)` when the provider has no
    /// change-token support and the caller must fall back to fingerprints.
    async fn list_changes(
        &self,
        media_type: MediaType,
        since_token: &str,
    ) -> Result<Option<ProviderChanges>>;

    /// Current change token, or `None` when unsupported.
    async fn change_token(&self) -> Result<Option<String>>;

    /// Heavy fields for one item, fetched on demand.
    async fn get_extended(
        &self,
        media_type: MediaType,
        host_library_id: i64,
    ) -> Result<ExtendedBag>;

    /// Host major version; a change forces a full rescan.
    async fn version(&self) -> Result<i32>;

    /// Whether the host is currently playing media. Heavy background work is
    /// deferred while true.
    async fn is_playing(&self) -> bool;
}
