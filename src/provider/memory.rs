use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use super::traits::{LibraryProvider, ProviderChanges, ProviderPage};
use crate::models::{ExtendedBag, LightItem, MediaType};

/// In-memory provider used by tests and by service wiring before a host
/// transport is configured. Items, extended bags, version, playback flag,
/// and failure injection are all settable.
pub struct MemoryProvider {
    items: Mutex<HashMap<MediaType, Vec<LightItem>>>,
    extended: Mutex<HashMap<(MediaType, i64), serde_json::Value>>,
    removed: Mutex<Vec<(MediaType, i64)>>,
    version: AtomicI32,
    playing: AtomicBool,
    fail_next_pages: AtomicU32,
    change_token: Mutex<Option<String>>,
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProvider")
            .field("version", &self.version.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            extended: Mutex::new(HashMap::new()),
            removed: Mutex::new(Vec::new()),
            version: AtomicI32::new(1),
            playing: AtomicBool::new(false),
            fail_next_pages: AtomicU32::new(0),
            change_token: Mutex::new(None),
        }
    }

    pub fn set_items(&self, media_type: MediaType, items: Vec<LightItem>) {
        self.items.lock().unwrap().insert(media_type, items);
    }

    pub fn set_extended(&self, media_type: MediaType, host_id: i64, bag: serde_json::Value) {
        self.extended
            .lock()
            .unwrap()
            .insert((media_type, host_id), bag);
    }

    /// Mark host ids as removed; reported by the next `list_changes` call.
    pub fn mark_removed(&self, media_type: MediaType, host_ids: &[i64]) {
        let mut removed = self.removed.lock().unwrap();
        removed.extend(host_ids.iter().map(|id| (media_type, *id)));
    }

    pub fn set_version(&self, version: i32) {
        self.version.store(version, Ordering::Relaxed);
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    /// Make the next `n` page fetches fail, then recover.
    pub fn fail_next_pages(&self, n: u32) {
        self.fail_next_pages.store(n, Ordering::Relaxed);
    }

    /// Enable change-token support with the given token value.
    pub fn set_change_token(&self, token: &str) {
        *self.change_token.lock().unwrap() = Some(token.to_string());
    }

    fn take_failure(&self) -> bool {
        self.fail_next_pages
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                if n > 0 { Some(n - 1) } else { None }
            })
            .is_ok()
    }
}

#[async_trait]
impl LibraryProvider for MemoryProvider {
    async fn list(
        &self,
        media_type: MediaType,
        cursor: Option<&str>,
        page_size: u64,
    ) -> Result<ProviderPage> {
        if self.take_failure() {
            return Err(anyhow!("injected provider failure"));
        }

        let items = self.items.lock().unwrap();
        let all = items.get(&media_type).cloned().unwrap_or_default();
        let offset: usize = match cursor {
            Some(c) => c.parse().map_err(|_| anyhow!("bad cursor: {c:?}"))?,
            None => 0,
        };
        let end = (offset + page_size as usize).min(all.len());
        let page: Vec<LightItem> = all[offset.min(all.len())..end].to_vec();
        let next_cursor = if end < all.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(ProviderPage {
            items: page,
            next_cursor,
        })
    }

    async fn list_changes(
        &self,
        media_type: MediaType,
        _since_token: &str,
    ) -> Result<Option<ProviderChanges>> {
        let token = self.change_token.lock().unwrap().clone();
        let Some(next_token) = token else {
            return Ok(None);
        };
        if self.take_failure() {
            return Err(anyhow!("injected provider failure"));
        }
        let changed = self
            .items
            .lock()
            .unwrap()
            .get(&media_type)
            .cloned()
            .unwrap_or_default();
        let removed = self
            .removed
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == media_type)
            .map(|(_, id)| *id)
            .collect();
        Ok(Some(ProviderChanges {
            changed,
            removed,
            next_token,
        }))
    }

    async fn change_token(&self) -> Result<Option<String>> {
        Ok(self.change_token.lock().unwrap().clone())
    }

    async fn get_extended(
        &self,
        media_type: MediaType,
        host_library_id: i64,
    ) -> Result<ExtendedBag> {
        let extended = self.extended.lock().unwrap();
        match extended.get(&(media_type, host_library_id)) {
            Some(bag) => Ok(ExtendedBag(bag.clone())),
            None => Err(anyhow!(
                "no extended metadata for {media_type}/{host_library_id}"
            )),
        }
    }

    async fn version(&self) -> Result<i32> {
        Ok(self.version.load(Ordering::Relaxed))
    }

    async fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(host_id: i64, title: &str) -> LightItem {
        LightItem {
            host_library_id: host_id,
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn pages_through_items() {
        let provider = MemoryProvider::new();
        provider.set_items(
            MediaType::Movie,
            (1..=5).map(|i| item(i, &format!("Movie {i}"))).collect(),
        );

        let first = provider.list(MediaType::Movie, None, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        let cursor = first.next_cursor.unwrap();

        let second = provider
            .list(MediaType::Movie, Some(&cursor), 2)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);

        let third = provider
            .list(MediaType::Movie, second.next_cursor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(third.items.len(), 1);
        assert!(third.next_cursor.is_none());
    }

    #[tokio::test]
    async fn injected_failures_recover() {
        let provider = MemoryProvider::new();
        provider.set_items(MediaType::Movie, vec![item(1, "A")]);
        provider.fail_next_pages(1);

        assert!(provider.list(MediaType::Movie, None, 10).await.is_err());
        assert!(provider.list(MediaType::Movie, None, 10).await.is_ok());
    }

    #[tokio::test]
    async fn change_support_is_optional() {
        let provider = MemoryProvider::new();
        assert!(
            provider
                .list_changes(MediaType::Movie, "t0")
                .await
                .unwrap()
                .is_none()
        );

        provider.set_change_token("t1");
        provider.set_items(MediaType::Movie, vec![item(1, "A")]);
        provider.mark_removed(MediaType::Movie, &[9]);
        let changes = provider
            .list_changes(MediaType::Movie, "t0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(changes.changed.len(), 1);
        assert_eq!(changes.removed, vec![9]);
        assert_eq!(changes.next_token, "t1");
    }
}
