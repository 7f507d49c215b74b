pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repository;

pub use connection::{Database, DatabaseConnection};

use crate::constants::{FAVORITES_LIST, SEARCH_HISTORY_FOLDER};
use anyhow::Result;
use repository::folder_repository::{FolderRepository, FolderRepositoryImpl};
use repository::list_repository::{ListRepository, ListRepositoryImpl};
use tracing::info;

/// Ensure the reserved structures exist. Idempotent; runs at every startup
/// after migrations.
pub async fn bootstrap(db: &DatabaseConnection) -> Result<()> {
    let folders = FolderRepositoryImpl::new(db.clone());
    let lists = ListRepositoryImpl::new(db.clone());

    if folders
        .find_by_name_and_parent(SEARCH_HISTORY_FOLDER, None)
        .await?
        .is_none()
    {
        info!("Creating reserved folder {:?}", SEARCH_HISTORY_FOLDER);
        folders.insert(SEARCH_HISTORY_FOLDER, None).await?;
    }

    if lists
        .find_by_name_and_folder(FAVORITES_LIST, None)
        .await?
        .is_none()
    {
        info!("Creating default list {:?}", FAVORITES_LIST);
        lists.insert(FAVORITES_LIST, None).await?;
    }

    Ok(())
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// Fresh in-memory store with migrations and bootstrap applied.
    pub async fn memory_db() -> DatabaseConnection {
        let db = Database::connect_memory().await.expect("open memory db");
        db.migrate().await.expect("migrate");
        let conn = db.get_connection();
        bootstrap(&conn).await.expect("bootstrap");
        conn
    }
}
