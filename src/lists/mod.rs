//! Folder and list lifecycle: hierarchy with unique names per level, ordered
//! list membership, merge/copy operations, and the reserved Search History
//! folder.

use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{FAVORITES_LIST, SEARCH_HISTORY_FOLDER};
use crate::db::DatabaseConnection;
use crate::db::entities::{FolderModel, ListItemModel, ListModel};
use crate::db::repository::Repository;
use crate::db::repository::folder_repository::{FolderRepository, FolderRepositoryImpl};
use crate::db::repository::list_repository::{ListRepository, ListRepositoryImpl};
use crate::db::repository::media_repository::MediaRepositoryImpl;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("a folder or list with this name already exists at this level")]
    DuplicateName,
    #[error("this folder is reserved and cannot be modified")]
    Reserved,
    #[error("move rejected: target is a descendant of the source")]
    Cycle,
    #[error("folder, list, or item not found")]
    NotFound,
    #[error("name must not be empty")]
    InvalidName,
    #[error("source list is not a search-history list")]
    NotSearchHistory,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type ListResult<T> = Result<T, ListError>;

/// Outcome of `add_item`; duplicates are ignored rather than errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

pub struct ListManager {
    db: DatabaseConnection,
    folders: FolderRepositoryImpl,
    lists: ListRepositoryImpl,
    media: MediaRepositoryImpl,
    quick_add_list_id: Option<i64>,
}

impl ListManager {
    pub fn new(db: DatabaseConnection, quick_add_list_id: Option<i64>) -> Self {
        Self {
            folders: FolderRepositoryImpl::new(db.clone()),
            lists: ListRepositoryImpl::new(db.clone()),
            media: MediaRepositoryImpl::new(db.clone()),
            db,
            quick_add_list_id,
        }
    }

    // -- folders -----------------------------------------------------------

    pub async fn create_folder(&self, name: &str, parent_id: Option<i64>) -> ListResult<i64> {
        let name = validated_name(name)?;
        if let Some(parent) = parent_id {
            self.folders
                .find_by_id(parent)
                .await?
                .ok_or(ListError::NotFound)?;
        }
        if self
            .folders
            .find_by_name_and_parent(name, parent_id)
            .await?
            .is_some()
        {
            return Err(ListError::DuplicateName);
        }
        let folder = self.folders.insert(name, parent_id).await?;
        info!(folder_id = folder.id, name, "Created folder");
        Ok(folder.id)
    }

    pub async fn rename_folder(&self, id: i64, name: &str) -> ListResult<()> {
        let name = validated_name(name)?;
        let folder = self.require_folder(id).await?;
        if is_reserved(&folder) {
            return Err(ListError::Reserved);
        }
        if let Some(existing) = self
            .folders
            .find_by_name_and_parent(name, folder.parent_id)
            .await?
            && existing.id != id
        {
            return Err(ListError::DuplicateName);
        }
        self.folders.rename(id, name).await?;
        Ok(())
    }

    pub async fn move_folder(&self, id: i64, new_parent_id: Option<i64>) -> ListResult<()> {
        let folder = self.require_folder(id).await?;
        if is_reserved(&folder) {
            return Err(ListError::Reserved);
        }
        if let Some(parent) = new_parent_id {
            self.require_folder(parent).await?;
            // The new parent must not be the folder itself or any descendant.
            if parent == id || self.is_descendant(parent, id).await? {
                return Err(ListError::Cycle);
            }
        }
        if let Some(existing) = self
            .folders
            .find_by_name_and_parent(&folder.name, new_parent_id)
            .await?
            && existing.id != id
        {
            return Err(ListError::DuplicateName);
        }
        self.folders.set_parent(id, new_parent_id).await?;
        Ok(())
    }

    /// Delete a folder; subfolders, lists, and memberships cascade through
    /// arbitrary depth.
    pub async fn delete_folder(&self, id: i64) -> ListResult<()> {
        let folder = self.require_folder(id).await?;
        if is_reserved(&folder) {
            return Err(ListError::Reserved);
        }
        self.folders.delete(id).await?;
        info!(folder_id = id, "Deleted folder");
        Ok(())
    }

    pub async fn folder(&self, id: i64) -> ListResult<FolderModel> {
        self.require_folder(id).await
    }

    pub async fn subfolders(&self, parent_id: Option<i64>) -> ListResult<Vec<FolderModel>> {
        Ok(self.folders.find_children(parent_id).await?)
    }

    /// Id of the reserved Search History folder, created at bootstrap.
    pub async fn search_history_folder_id(&self) -> ListResult<i64> {
        self.folders
            .find_by_name_and_parent(SEARCH_HISTORY_FOLDER, None)
            .await?
            .map(|folder| folder.id)
            .ok_or(ListError::NotFound)
    }

    // -- lists -------------------------------------------------------------

    pub async fn create_list(&self, name: &str, folder_id: Option<i64>) -> ListResult<i64> {
        let name = validated_name(name)?;
        if let Some(folder) = folder_id {
            self.require_folder(folder).await?;
        }
        if self
            .lists
            .find_by_name_and_folder(name, folder_id)
            .await?
            .is_some()
        {
            return Err(ListError::DuplicateName);
        }
        let list = self.lists.insert(name, folder_id).await?;
        info!(list_id = list.id, name, "Created list");
        Ok(list.id)
    }

    pub async fn rename_list(&self, id: i64, name: &str) -> ListResult<()> {
        let name = validated_name(name)?;
        let list = self.require_list(id).await?;
        if let Some(existing) = self
            .lists
            .find_by_name_and_folder(name, list.folder_id)
            .await?
            && existing.id != id
        {
            return Err(ListError::DuplicateName);
        }
        self.lists.rename(id, name).await?;
        Ok(())
    }

    pub async fn move_list(&self, id: i64, folder_id: Option<i64>) -> ListResult<()> {
        let list = self.require_list(id).await?;
        if let Some(folder) = folder_id {
            self.require_folder(folder).await?;
        }
        if let Some(existing) = self
            .lists
            .find_by_name_and_folder(&list.name, folder_id)
            .await?
            && existing.id != id
        {
            return Err(ListError::DuplicateName);
        }
        self.lists.set_folder(id, folder_id).await?;
        Ok(())
    }

    pub async fn delete_list(&self, id: i64) -> ListResult<()> {
        self.require_list(id).await?;
        self.lists.delete(id).await?;
        info!(list_id = id, "Deleted list");
        Ok(())
    }

    pub async fn list(&self, id: i64) -> ListResult<ListModel> {
        self.require_list(id).await
    }

    pub async fn lists_in_folder(&self, folder_id: Option<i64>) -> ListResult<Vec<ListModel>> {
        Ok(self.lists.find_in_folder(folder_id).await?)
    }

    /// Lists directly inside the reserved folder are capture-only search
    /// history; callers use this tag to exempt them from their own remove
    /// workflows.
    pub async fn is_search_history_list(&self, list_id: i64) -> ListResult<bool> {
        let list = self.require_list(list_id).await?;
        let reserved = self.search_history_folder_id().await?;
        Ok(list.folder_id == Some(reserved))
    }

    // -- membership --------------------------------------------------------

    pub async fn add_item(&self, list_id: i64, media_item_id: i64) -> ListResult<AddOutcome> {
        self.require_list(list_id).await?;
        self.media
            .find_by_id(media_item_id)
            .await?
            .ok_or(ListError::NotFound)?;

        if self.lists.find_item(list_id, media_item_id).await?.is_some() {
            return Ok(AddOutcome::AlreadyPresent);
        }
        let position = self.lists.max_position(list_id).await?.unwrap_or(0) + 1;
        ListRepositoryImpl::insert_item_in(
            self.db(),
            list_id,
            media_item_id,
            position,
        )
        .await?;
        debug!(list_id, media_item_id, position, "Added list item");
        Ok(AddOutcome::Added)
    }

    /// Delete one membership row. Remaining positions keep their values.
    pub async fn remove_item(&self, list_id: i64, list_item_id: i64) -> ListResult<()> {
        let items = self.lists.find_items(list_id).await?;
        if !items.iter().any(|item| item.id == list_item_id) {
            return Err(ListError::NotFound);
        }
        self.lists.delete_item(list_item_id).await?;
        Ok(())
    }

    pub async fn items(&self, list_id: i64) -> ListResult<Vec<ListItemModel>> {
        self.require_list(list_id).await?;
        Ok(self.lists.find_items(list_id).await?)
    }

    /// Append items of `src` missing from `dst`, in source position order.
    /// Returns the number appended; `src` is left untouched.
    pub async fn merge_list(&self, dst: i64, src: i64) -> ListResult<usize> {
        self.require_list(src).await?;
        self.require_list(dst).await?;
        if self.is_search_history_list(dst).await? {
            return Err(ListError::Reserved);
        }

        let existing: std::collections::HashSet<i64> = self
            .lists
            .find_items(dst)
            .await?
            .into_iter()
            .map(|item| item.media_item_id)
            .collect();
        let mut position = self.lists.max_position(dst).await?.unwrap_or(0);
        let mut appended = 0usize;
        for item in self.lists.find_items(src).await? {
            if existing.contains(&item.media_item_id) {
                continue;
            }
            position += 1;
            ListRepositoryImpl::insert_item_in(self.db(), dst, item.media_item_id, position)
                .await?;
            appended += 1;
        }
        info!(dst, src, appended, "Merged lists");
        Ok(appended)
    }

    /// Materialize a search-history capture as a user list, preserving order.
    pub async fn move_to_new_list(
        &self,
        src_list_id: i64,
        new_name: &str,
        target_folder: Option<i64>,
    ) -> ListResult<i64> {
        if !self.is_search_history_list(src_list_id).await? {
            return Err(ListError::NotSearchHistory);
        }
        let new_id = self.create_list(new_name, target_folder).await?;
        let mut position = 0i64;
        for item in self.lists.find_items(src_list_id).await? {
            position += 1;
            ListRepositoryImpl::insert_item_in(self.db(), new_id, item.media_item_id, position)
                .await?;
        }
        Ok(new_id)
    }

    /// Add to the configured default list, falling back to `Favorites`.
    pub async fn quick_add(&self, media_item_id: i64) -> ListResult<AddOutcome> {
        let list_id = match self.quick_add_list_id {
            Some(id) if self.lists.find_by_id(id).await?.is_some() => id,
            _ => self
                .lists
                .find_by_name_and_folder(FAVORITES_LIST, None)
                .await?
                .ok_or(ListError::NotFound)?
                .id,
        };
        self.add_item(list_id, media_item_id).await
    }

    // -- internals ---------------------------------------------------------

    fn db(&self) -> &sea_orm::DatabaseConnection {
        self.db.as_ref()
    }

    async fn require_folder(&self, id: i64) -> ListResult<FolderModel> {
        self.folders
            .find_by_id(id)
            .await?
            .ok_or(ListError::NotFound)
    }

    async fn require_list(&self, id: i64) -> ListResult<ListModel> {
        self.lists.find_by_id(id).await?.ok_or(ListError::NotFound)
    }

    /// Whether `candidate` sits underneath `ancestor` in the folder tree.
    async fn is_descendant(&self, candidate: i64, ancestor: i64) -> ListResult<bool> {
        let mut current = self.require_folder(candidate).await?.parent_id;
        while let Some(parent) = current {
            if parent == ancestor {
                return Ok(true);
            }
            current = self.require_folder(parent).await?.parent_id;
        }
        Ok(false)
    }
}

fn validated_name(name: &str) -> ListResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ListError::InvalidName);
    }
    Ok(trimmed)
}

fn is_reserved(folder: &FolderModel) -> bool {
    folder.parent_id.is_none() && folder.name == SEARCH_HISTORY_FOLDER
}
