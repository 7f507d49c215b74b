//! Cross-module scenarios: scan feeding search and sync, backup round trips,
//! and reconciliation against a mock remote.

use std::sync::Arc;

use librarian::backup::BackupEngine;
use librarian::db::repository::Repository;
use librarian::db::repository::media_repository::{MediaRepository, MediaRepositoryImpl};
use librarian::db::repository::sync_repository::SyncRepositoryImpl;
use librarian::db::{Database, DatabaseConnection, bootstrap};
use librarian::lists::ListManager;
use librarian::models::{LightItem, MediaType};
use librarian::provider::MemoryProvider;
use librarian::scanner::Scanner;
use librarian::search::{SearchEngine, SearchQuery};
use librarian::sync::{CycleOutcome, SyncApi, SyncReconciler};
use tokio_util::sync::CancellationToken;

async fn fresh_db() -> DatabaseConnection {
    let database = Database::connect_memory().await.expect("open db");
    database.migrate().await.expect("migrate");
    let db = database.get_connection();
    bootstrap(&db).await.expect("bootstrap");
    db
}

fn movie(host_id: i64, title: &str, imdb: &str, plot: &str) -> LightItem {
    LightItem {
        host_library_id: host_id,
        title: title.to_string(),
        year: Some(2008),
        imdb_id: Some(imdb.to_string()),
        plot: Some(plot.to_string()),
        duration_seconds: Some(9000),
        ..Default::default()
    }
}

fn scanner_for(db: &DatabaseConnection, provider: Arc<MemoryProvider>) -> Scanner {
    Scanner::new(db.clone(), provider, 200, CancellationToken::new())
}

#[tokio::test]
async fn scan_then_search_then_materialize() {
    let db = fresh_db().await;
    let provider = Arc::new(MemoryProvider::new());
    provider.set_items(
        MediaType::Movie,
        vec![
            movie(1, "Dark Knight", "tt1", "Gotham hero"),
            movie(2, "Knight Rider", "tt2", "Dark car"),
            movie(3, "Heat", "tt3", "Los Angeles"),
        ],
    );

    let scanner = scanner_for(&db, provider);
    scanner.full_scan(&[MediaType::Movie]).await.unwrap();

    let engine = SearchEngine::new(db.clone());
    let outcome = engine
        .execute(&SearchQuery::new("dark knight"))
        .await
        .unwrap();
    assert_eq!(outcome.item_ids.len(), 2);

    // The capture is a real search-history list that can be copied out.
    let manager = ListManager::new(db.clone(), None);
    assert!(
        manager
            .is_search_history_list(outcome.history_list_id)
            .await
            .unwrap()
    );
    let copied = manager
        .move_to_new_list(outcome.history_list_id, "Knight Movies", None)
        .await
        .unwrap();
    let items = manager.items(copied).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(
        items.iter().map(|i| i.position).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn backup_survives_store_wipe() {
    let db = fresh_db().await;
    let provider = Arc::new(MemoryProvider::new());
    provider.set_items(
        MediaType::Movie,
        vec![movie(1, "Movie", "tt9", "A plot")],
    );
    scanner_for(&db, provider)
        .full_scan(&[MediaType::Movie])
        .await
        .unwrap();

    let manager = ListManager::new(db.clone(), None);
    let folder = manager.create_folder("X", None).await.unwrap();
    let list = manager.create_list("L", Some(folder)).await.unwrap();
    let media = MediaRepositoryImpl::new(db.clone());
    let item = media.find_by_imdb("tt9").await.unwrap().remove(0);
    manager.add_item(list, item.id).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.ndjson");
    BackupEngine::new(db.clone()).export(&path).await.unwrap();

    // Empty store: the import must rebuild hierarchy and a placeholder item.
    let restored = fresh_db().await;
    let report = BackupEngine::new(restored.clone())
        .import(&path)
        .await
        .unwrap();
    assert_eq!(report.folders_created, 1);
    assert_eq!(report.items_added, 1);

    let manager = ListManager::new(restored.clone(), None);
    let folders = manager.subfolders(None).await.unwrap();
    let x = folders.iter().find(|f| f.name == "X").expect("folder X");
    let lists = manager.lists_in_folder(Some(x.id)).await.unwrap();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].name, "L");

    let items = manager.items(lists[0].id).await.unwrap();
    assert_eq!(items.len(), 1);
    let row = MediaRepositoryImpl::new(restored.clone())
        .find_by_id(items[0].media_item_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.imdb_id.as_deref(), Some("tt9"));
}

#[tokio::test]
async fn scan_feeds_reconciler_and_second_cycle_is_quiet() {
    let db = fresh_db().await;
    let provider = Arc::new(MemoryProvider::new());
    provider.set_items(
        MediaType::Movie,
        vec![
            movie(1, "One", "tt1", ""),
            movie(2, "Two", "tt2", ""),
            movie(3, "Three", "tt3", ""),
        ],
    );
    scanner_for(&db, provider)
        .full_scan(&[MediaType::Movie])
        .await
        .unwrap();

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/library/version")
        .with_body(r#"{"version":"7","etag":"abc","item_count":3}"#)
        .expect(2)
        .create_async()
        .await;
    server
        .mock(
            "GET",
            mockito::Matcher::Regex(r"^/library/ids".to_string()),
        )
        .with_body(
            serde_json::json!({
                "imdb_ids": ["tt2", "tt3", "tt4"],
                "version": "7",
                "etag": "abc",
                "total": 3,
                "page": 1,
            })
            .to_string(),
        )
        .expect(1)
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
        .with_body(r#"{"removed":1,"version":"9","etag":"abc"}"#)
        .create_async()
        .await;

    let reconciler = SyncReconciler::new(db.clone(), 5_000, 1);
    let api = SyncApi::new(&server.url(), "Bearer", "secret").unwrap();

    let outcome = reconciler.run_cycle(&api).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Reconciled { drained: 2, .. }));
    add_mock.assert_async().await;
    remove_mock.assert_async().await;

    let sync = SyncRepositoryImpl::new(db.clone());
    let snapshot = sync.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(sync.pending_count().await.unwrap(), 0);

    // Nothing changed: the follow-up cycle stops at the version probe.
    let second = reconciler.run_cycle(&api).await.unwrap();
    assert_eq!(second, CycleOutcome::NoChange);
}

#[tokio::test]
async fn sweep_never_touches_list_owned_items() {
    let db = fresh_db().await;
    let provider = Arc::new(MemoryProvider::new());
    provider.set_items(MediaType::Movie, vec![movie(1, "Kept", "tt1", "")]);

    let scanner = scanner_for(&db, provider.clone());
    scanner.full_scan(&[MediaType::Movie]).await.unwrap();

    // A manual/external item sits in a list.
    let media = MediaRepositoryImpl::new(db.clone());
    let external = media
        .insert_external(
            MediaType::External,
            "Plugin Pick",
            None,
            None,
            None,
            Some("plugin://pick"),
        )
        .await
        .unwrap();
    let manager = ListManager::new(db.clone(), None);
    let list = manager.create_list("Picks", None).await.unwrap();
    manager.add_item(list, external.id).await.unwrap();

    // Library empties out entirely; only lib rows are swept.
    provider.set_items(MediaType::Movie, vec![]);
    let summary = scanner.full_scan(&[MediaType::Movie]).await.unwrap();
    assert_eq!(summary.items_removed, 1);

    assert_eq!(manager.items(list).await.unwrap().len(), 1);
    assert!(media.find_by_id(external.id).await.unwrap().is_some());
}
