use super::{BaseRepository, Repository};
use crate::db::entities::{Folder, FolderActiveModel, FolderModel, folders};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;

#[async_trait]
pub trait FolderRepository: Repository<FolderModel> {
    /// Folder with the given name directly under `parent_id` (None = root).
    async fn find_by_name_and_parent(
        &self,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Option<FolderModel>>;

    /// Direct children of `parent_id` (None = root), ordered by name.
    async fn find_children(&self, parent_id: Option<i64>) -> Result<Vec<FolderModel>>;

    async fn insert(&self, name: &str, parent_id: Option<i64>) -> Result<FolderModel>;

    async fn rename(&self, id: i64, name: &str) -> Result<FolderModel>;

    async fn set_parent(&self, id: i64, parent_id: Option<i64>) -> Result<FolderModel>;
}

#[derive(Debug)]
pub struct FolderRepositoryImpl {
    base: BaseRepository,
}

impl FolderRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl Repository<FolderModel> for FolderRepositoryImpl {
    type Entity = Folder;

    async fn find_by_id(&self, id: i64) -> Result<Option<FolderModel>> {
        Ok(Folder::find_by_id(id).one(self.base.db.as_ref()).await?)
    }

    async fn find_all(&self) -> Result<Vec<FolderModel>> {
        Ok(Folder::find()
            .order_by_asc(folders::Column::Id)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        Folder::delete_by_id(id).exec(self.base.db.as_ref()).await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(Folder::find().count(self.base.db.as_ref()).await?)
    }
}

#[async_trait]
impl FolderRepository for FolderRepositoryImpl {
    async fn find_by_name_and_parent(
        &self,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<Option<FolderModel>> {
        let mut query = Folder::find().filter(folders::Column::Name.eq(name));
        query = match parent_id {
            Some(parent) => query.filter(folders::Column::ParentId.eq(parent)),
            None => query.filter(folders::Column::ParentId.is_null()),
        };
        Ok(query.one(self.base.db.as_ref()).await?)
    }

    async fn find_children(&self, parent_id: Option<i64>) -> Result<Vec<FolderModel>> {
        let mut query = Folder::find().order_by_asc(folders::Column::Name);
        query = match parent_id {
            Some(parent) => query.filter(folders::Column::ParentId.eq(parent)),
            None => query.filter(folders::Column::ParentId.is_null()),
        };
        Ok(query.all(self.base.db.as_ref()).await?)
    }

    async fn insert(&self, name: &str, parent_id: Option<i64>) -> Result<FolderModel> {
        let active = FolderActiveModel {
            name: Set(name.to_string()),
            parent_id: Set(parent_id),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };
        Ok(active.insert(self.base.db.as_ref()).await?)
    }

    async fn rename(&self, id: i64, name: &str) -> Result<FolderModel> {
        let mut active = FolderActiveModel {
            id: Set(id),
            ..Default::default()
        };
        active.name = Set(name.to_string());
        Ok(active.update(self.base.db.as_ref()).await?)
    }

    async fn set_parent(&self, id: i64, parent_id: Option<i64>) -> Result<FolderModel> {
        let mut active = FolderActiveModel {
            id: Set(id),
            ..Default::default()
        };
        active.parent_id = Set(parent_id);
        Ok(active.update(self.base.db.as_ref()).await?)
    }
}
