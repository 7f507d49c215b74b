use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::client::{IdsResponse, SyncApi};
use super::error::SyncApiError;
use super::retry::RetryPolicy;
use crate::db::DatabaseConnection;
use crate::db::entities::PendingKind;
use crate::db::repository::media_repository::{MediaRepository, MediaRepositoryImpl};
use crate::db::repository::sync_repository::SyncRepositoryImpl;
use crate::models::{ImdbId, normalize_imdb_ids};

/// Server pages fetched per request when pulling the authoritative id set.
const IDS_PAGE_SIZE: usize = 1_000;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("authorization failed; token refresh required")]
    Auth,
    #[error("sync cycle aborted: {0}")]
    Api(#[from] SyncApiError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Version probe showed nothing to do.
    NoChange,
    Reconciled {
        enqueued_adds: usize,
        enqueued_removes: usize,
        drained: usize,
        invalid_ids: usize,
    },
}

/// Differential reconciler: keeps the remote set of IMDb ids equal to the
/// local library's, diffing against the persisted snapshot and delivering
/// changes through a durable idempotent queue.
pub struct SyncReconciler {
    media: MediaRepositoryImpl,
    sync: SyncRepositoryImpl,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl SyncReconciler {
    pub fn new(db: DatabaseConnection, chunk_size: usize, max_retries: u32) -> Self {
        Self {
            media: MediaRepositoryImpl::new(db.clone()),
            sync: SyncRepositoryImpl::new(db),
            chunk_size: chunk_size.min(crate::constants::MAX_SYNC_CHUNK_SIZE),
            retry: RetryPolicy::new(max_retries, 1_000, 60_000),
        }
    }

    /// One reconciliation cycle against the remote.
    ///
    /// A transient failure leaves the queue intact with bumped retry counts;
    /// an auth failure surfaces as `CycleError::Auth` so the caller can
    /// refresh the token and resume next cycle.
    pub async fn run_cycle(&self, api: &SyncApi) -> Result<CycleOutcome, CycleError> {
        let state = self.sync.get_or_init().await?;
        let previous = self.sync.snapshot().await?;
        let local = self.media.library_imdb_set().await?;

        let probe = self
            .retry
            .execute("library_version", || api.get_version())
            .await
            .map_err(map_auth)?;
        debug!(version = %probe.version, etag = %probe.etag, "Version probe");

        let etag_prev = state.server_etag.clone();
        if etag_prev.as_deref() == Some(probe.etag.as_str())
            && local == previous
            && self.sync.pending_count().await? == 0
        {
            debug!("Remote and local unchanged since last cycle");
            return Ok(CycleOutcome::NoChange);
        }

        let (fetched, invalid_ids) = self.fetch_server_ids(api, etag_prev.as_deref()).await?;
        let server_set = match fetched {
            Some(ids) => ids,
            // 304: the server set is exactly what we reconciled last time.
            None => previous.clone(),
        };

        // Ids already queued from an earlier failed cycle keep their original
        // idempotency keys; the fresh delta must not duplicate them.
        let mut queued_adds: BTreeSet<ImdbId> = BTreeSet::new();
        let mut queued_removes: BTreeSet<ImdbId> = BTreeSet::new();
        for op in self.sync.pending().await? {
            let ids = SyncRepositoryImpl::decode_ids(&op)?;
            match PendingKind::from_str(&op.operation) {
                Some(PendingKind::Add) => queued_adds.extend(ids),
                Some(PendingKind::Remove) => queued_removes.extend(ids),
                None => {}
            }
        }

        let to_add: Vec<ImdbId> = local
            .difference(&server_set)
            .filter(|id| !queued_adds.contains(*id))
            .cloned()
            .collect();
        let to_remove: Vec<ImdbId> = server_set
            .difference(&local)
            .filter(|id| !queued_removes.contains(*id))
            .cloned()
            .collect();
        info!(
            adds = to_add.len(),
            removes = to_remove.len(),
            "Computed reconciliation delta"
        );

        let mut enqueued_adds = 0usize;
        for chunk in to_add.chunks(self.chunk_size) {
            self.sync.enqueue(PendingKind::Add, chunk).await?;
            enqueued_adds += 1;
        }
        let mut enqueued_removes = 0usize;
        for chunk in to_remove.chunks(self.chunk_size) {
            self.sync.enqueue(PendingKind::Remove, chunk).await?;
            enqueued_removes += 1;
        }

        let mut version = probe.version;
        let mut etag = probe.etag;
        let drained = self.drain_queue(api, &mut version, &mut etag).await?;

        self.sync
            .save_snapshot(&local, Some(&version), Some(&etag))
            .await?;
        info!(version = %version, etag = %etag, "Cycle reconciled");

        Ok(CycleOutcome::Reconciled {
            enqueued_adds,
            enqueued_removes,
            drained,
            invalid_ids,
        })
    }

    /// Pull the authoritative server id set, or `None` on a 304 for the
    /// cached etag. Invalid ids are filtered and counted, never stored.
    async fn fetch_server_ids(
        &self,
        api: &SyncApi,
        etag: Option<&str>,
    ) -> Result<(Option<BTreeSet<ImdbId>>, usize), CycleError> {
        let mut collected: BTreeSet<ImdbId> = BTreeSet::new();
        let mut invalid_total = 0usize;
        let mut page = 1u32;
        loop {
            let if_none_match = if page == 1 { etag } else { None };
            let response = self
                .retry
                .execute("library_ids", || {
                    api.get_ids_page(page, IDS_PAGE_SIZE, if_none_match)
                })
                .await
                .map_err(map_auth)?;

            match response {
                IdsResponse::NotModified => return Ok((None, invalid_total)),
                IdsResponse::Page(body) => {
                    let (valid, invalid) =
                        normalize_imdb_ids(body.imdb_ids.iter().map(String::as_str));
                    if invalid > 0 {
                        warn!(invalid, page, "Server returned malformed IMDb ids");
                        invalid_total += invalid;
                    }
                    let received = body.imdb_ids.len();
                    collected.extend(valid);
                    if received < IDS_PAGE_SIZE || collected.len() as u64 >= body.total {
                        return Ok((Some(collected), invalid_total));
                    }
                    page += 1;
                }
            }
        }
    }

    /// Deliver queued operations FIFO. Success removes the operation and
    /// advances version/etag; permanent 4xx drops it with a record; transient
    /// failure bumps retry_count and aborts the cycle with the op queued
    /// under its original idempotency key.
    async fn drain_queue(
        &self,
        api: &SyncApi,
        version: &mut String,
        etag: &mut String,
    ) -> Result<usize, CycleError> {
        let mut drained = 0usize;
        for op in self.sync.pending().await? {
            let ids = SyncRepositoryImpl::decode_ids(&op)?;
            let Some(kind) = PendingKind::from_str(&op.operation) else {
                warn!(op_id = op.id, operation = %op.operation, "Dropping unknown queued operation");
                self.sync.remove_operation(op.id).await?;
                continue;
            };

            let result = match kind {
                PendingKind::Add => {
                    self.retry
                        .execute("library_add", || api.add(&ids, &op.idempotency_key))
                        .await
                }
                PendingKind::Remove => {
                    self.retry
                        .execute("library_remove", || api.remove(&ids, &op.idempotency_key))
                        .await
                }
            };

            match result {
                Ok(response) => {
                    *version = response.version;
                    *etag = response.etag;
                    self.sync.remove_operation(op.id).await?;
                    drained += 1;
                    debug!(
                        op_id = op.id,
                        kind = kind.as_str(),
                        count = ids.len(),
                        "Delivered queued operation"
                    );
                }
                Err(e) if e.is_auth() => {
                    warn!(op_id = op.id, "Authorization failed mid-drain");
                    return Err(CycleError::Auth);
                }
                Err(e) if e.is_transient() => {
                    self.sync.bump_retry(op.id).await?;
                    warn!(op_id = op.id, "Delivery failed, operation stays queued: {e}");
                    return Err(CycleError::Api(e));
                }
                Err(e) => {
                    warn!(op_id = op.id, "Dropping rejected operation: {e}");
                    self.sync.remove_operation(op.id).await?;
                }
            }
        }
        Ok(drained)
    }
}

fn map_auth(e: SyncApiError) -> CycleError {
    if e.is_auth() {
        CycleError::Auth
    } else {
        CycleError::Api(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;
    use crate::models::{LightItem, MediaType};

    async fn seed_library(db: &DatabaseConnection, imdb_ids: &[&str]) {
        for (i, imdb) in imdb_ids.iter().enumerate() {
            let item = LightItem {
                host_library_id: (i + 1) as i64,
                title: format!("Movie {imdb}"),
                imdb_id: Some(imdb.to_string()),
                ..Default::default()
            };
            MediaRepositoryImpl::upsert_light_in(db.as_ref(), MediaType::Movie, &item, 1)
                .await
                .unwrap();
        }
    }

    fn ids_body(ids: &[&str], version: &str, etag: &str) -> String {
        serde_json::json!({
            "imdb_ids": ids,
            "version": version,
            "etag": etag,
            "total": ids.len(),
            "page": 1,
        })
        .to_string()
    }

    #[tokio::test]
    async fn delta_enqueues_and_drains_add_and_remove() {
        let db = memory_db().await;
        seed_library(&db, &["tt1", "tt2", "tt3"]).await;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/library/version")
            .with_body(r#"{"version":"7","etag":"abc","item_count":3}"#)
            .create_async()
            .await;
        server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/library/ids".to_string()),
            )
            .with_body(ids_body(&["tt2", "tt3", "tt4"], "7", "abc"))
            .create_async()
            .await;
        let add_mock = server
            .mock("POST", "/library/add")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"imdb_ids": ["tt1"]}),
            ))
            .with_body(r#"{"added":1,"version":"8","etag":"cde"}"#)
            .create_async()
            .await;
        let remove_mock = server
            .mock("POST", "/library/remove")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"imdb_ids": ["tt4"]}),
            ))
            .with_body(r#"{"removed":1,"version":"9","etag":"def"}"#)
            .create_async()
            .await;

        let reconciler = SyncReconciler::new(db.clone(), 5_000, 1);
        let api = SyncApi::new(&server.url(), "Bearer", "secret").unwrap();
        let outcome = reconciler.run_cycle(&api).await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Reconciled {
                enqueued_adds: 1,
                enqueued_removes: 1,
                drained: 2,
                invalid_ids: 0,
            }
        );
        add_mock.assert_async().await;
        remove_mock.assert_async().await;

        let sync = SyncRepositoryImpl::new(db.clone());
        let state = sync.get_or_init().await.unwrap();
        assert_eq!(state.server_version.as_deref(), Some("9"));
        assert_eq!(state.server_etag.as_deref(), Some("def"));
        let snapshot = sync.snapshot().await.unwrap();
        let expect: Vec<&str> = vec!["tt1", "tt2", "tt3"];
        assert_eq!(
            snapshot.iter().map(ImdbId::as_str).collect::<Vec<_>>(),
            expect
        );
        assert_eq!(sync.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn second_cycle_ends_after_version_probe() {
        let db = memory_db().await;
        seed_library(&db, &["tt1"]).await;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/library/version")
            .with_body(r#"{"version":"7","etag":"abc","item_count":1}"#)
            .expect(2)
            .create_async()
            .await;
        // ids endpoint must be hit exactly once, by the first cycle.
        let ids_mock = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/library/ids".to_string()),
            )
            .with_body(ids_body(&["tt1"], "7", "abc"))
            .expect(1)
            .create_async()
            .await;

        let reconciler = SyncReconciler::new(db.clone(), 5_000, 1);
        let api = SyncApi::new(&server.url(), "Bearer", "secret").unwrap();

        let first = reconciler.run_cycle(&api).await.unwrap();
        assert!(matches!(first, CycleOutcome::Reconciled { drained: 0, .. }));

        let second = reconciler.run_cycle(&api).await.unwrap();
        assert_eq!(second, CycleOutcome::NoChange);
        ids_mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_delivery_keeps_queue_and_idempotency_key() {
        let db = memory_db().await;
        seed_library(&db, &["tt1"]).await;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/library/version")
            .with_body(r#"{"version":"7","etag":"abc","item_count":0}"#)
            .create_async()
            .await;
        server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/library/ids".to_string()),
            )
            .with_body(ids_body(&[], "7", "abc"))
            .create_async()
            .await;
        server
            .mock("POST", "/library/add")
            .with_status(503)
            .with_body("down")
            .create_async()
            .await;

        let reconciler = SyncReconciler::new(db.clone(), 5_000, 0);
        let api = SyncApi::new(&server.url(), "Bearer", "secret").unwrap();
        assert!(matches!(
            reconciler.run_cycle(&api).await,
            Err(CycleError::Api(_))
        ));

        let sync = SyncRepositoryImpl::new(db.clone());
        let pending = sync.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
        let original_key = pending[0].idempotency_key.clone();

        // Snapshot untouched by the failed cycle.
        assert!(sync.snapshot().await.unwrap().is_empty());

        // Next cycle retries the same operation with the same key.
        let mut server2 = mockito::Server::new_async().await;
        server2
            .mock("GET", "/library/version")
            .with_body(r#"{"version":"7","etag":"abc","item_count":0}"#)
            .create_async()
            .await;
        server2
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/library/ids".to_string()),
            )
            .with_body(ids_body(&[], "7", "abc"))
            .create_async()
            .await;
        let add_mock = server2
            .mock("POST", "/library/add")
            .match_header("Idempotency-Key", original_key.as_str())
            .with_body(r#"{"added":1,"version":"8","etag":"def"}"#)
            .create_async()
            .await;

        let api2 = SyncApi::new(&server2.url(), "Bearer", "secret").unwrap();
        reconciler.run_cycle(&api2).await.unwrap();
        add_mock.assert_async().await;
        assert_eq!(sync.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn auth_failure_aborts_cycle() {
        let db = memory_db().await;
        seed_library(&db, &["tt1"]).await;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/library/version")
            .with_status(401)
            .with_body("expired")
            .create_async()
            .await;

        let reconciler = SyncReconciler::new(db.clone(), 5_000, 1);
        let api = SyncApi::new(&server.url(), "Bearer", "stale").unwrap();
        assert!(matches!(
            reconciler.run_cycle(&api).await,
            Err(CycleError::Auth)
        ));
    }

    #[tokio::test]
    async fn malformed_server_ids_are_filtered() {
        let db = memory_db().await;
        seed_library(&db, &["tt1"]).await;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/library/version")
            .with_body(r#"{"version":"7","etag":"abc","item_count":2}"#)
            .create_async()
            .await;
        server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/library/ids".to_string()),
            )
            .with_body(ids_body(&["tt1", "bogus"], "7", "abc"))
            .create_async()
            .await;

        let reconciler = SyncReconciler::new(db.clone(), 5_000, 1);
        let api = SyncApi::new(&server.url(), "Bearer", "secret").unwrap();
        let outcome = reconciler.run_cycle(&api).await.unwrap();

        // "bogus" is filtered before set math: nothing to add or remove.
        assert!(matches!(
            outcome,
            CycleOutcome::Reconciled {
                enqueued_adds: 0,
                enqueued_removes: 0,
                invalid_ids: 1,
                ..
            }
        ));
    }
}
