use super::{BaseRepository, Repository};
use crate::db::entities::{
    List, ListActiveModel, ListItem, ListItemActiveModel, ListItemModel, ListModel, list_items,
    lists,
};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;

#[async_trait]
pub trait ListRepository: Repository<ListModel> {
    /// List with the given name inside `folder_id` (None = root).
    async fn find_by_name_and_folder(
        &self,
        name: &str,
        folder_id: Option<i64>,
    ) -> Result<Option<ListModel>>;

    /// Lists directly inside `folder_id` (None = root), ordered by name.
    async fn find_in_folder(&self, folder_id: Option<i64>) -> Result<Vec<ListModel>>;

    async fn insert(&self, name: &str, folder_id: Option<i64>) -> Result<ListModel>;

    async fn rename(&self, id: i64, name: &str) -> Result<ListModel>;

    async fn set_folder(&self, id: i64, folder_id: Option<i64>) -> Result<ListModel>;

    /// Membership rows for a list, ordered by position.
    async fn find_items(&self, list_id: i64) -> Result<Vec<ListItemModel>>;

    /// Membership row for `(list_id, media_item_id)` if present.
    async fn find_item(&self, list_id: i64, media_item_id: i64)
    -> Result<Option<ListItemModel>>;

    /// Highest position in the list, if any item exists.
    async fn max_position(&self, list_id: i64) -> Result<Option<i64>>;

    /// Delete one membership row by its id. Positions are not renumbered.
    async fn delete_item(&self, list_item_id: i64) -> Result<()>;

    async fn count_items(&self, list_id: i64) -> Result<u64>;
}

#[derive(Debug)]
pub struct ListRepositoryImpl {
    base: BaseRepository,
}

impl ListRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Append a membership row inside the caller's transaction.
    pub async fn insert_item_in<C: ConnectionTrait>(
        conn: &C,
        list_id: i64,
        media_item_id: i64,
        position: i64,
    ) -> Result<ListItemModel> {
        let active = ListItemActiveModel {
            list_id: Set(list_id),
            media_item_id: Set(media_item_id),
            position: Set(position),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };
        Ok(active.insert(conn).await?)
    }

    /// Delete every membership row of a list inside the caller's transaction.
    pub async fn clear_items_in<C: ConnectionTrait>(conn: &C, list_id: i64) -> Result<u64> {
        let res = ListItem::delete_many()
            .filter(list_items::Column::ListId.eq(list_id))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }
}

#[async_trait]
impl Repository<ListModel> for ListRepositoryImpl {
    type Entity = List;

    async fn find_by_id(&self, id: i64) -> Result<Option<ListModel>> {
        Ok(List::find_by_id(id).one(self.base.db.as_ref()).await?)
    }

    async fn find_all(&self) -> Result<Vec<ListModel>> {
        Ok(List::find()
            .order_by_asc(lists::Column::Id)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        List::delete_by_id(id).exec(self.base.db.as_ref()).await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(List::find().count(self.base.db.as_ref()).await?)
    }
}

#[async_trait]
impl ListRepository for ListRepositoryImpl {
    async fn find_by_name_and_folder(
        &self,
        name: &str,
        folder_id: Option<i64>,
    ) -> Result<Option<ListModel>> {
        let mut query = List::find().filter(lists::Column::Name.eq(name));
        query = match folder_id {
            Some(folder) => query.filter(lists::Column::FolderId.eq(folder)),
            None => query.filter(lists::Column::FolderId.is_null()),
        };
        Ok(query.one(self.base.db.as_ref()).await?)
    }

    async fn find_in_folder(&self, folder_id: Option<i64>) -> Result<Vec<ListModel>> {
        let mut query = List::find().order_by_asc(lists::Column::Name);
        query = match folder_id {
            Some(folder) => query.filter(lists::Column::FolderId.eq(folder)),
            None => query.filter(lists::Column::FolderId.is_null()),
        };
        Ok(query.all(self.base.db.as_ref()).await?)
    }

    async fn insert(&self, name: &str, folder_id: Option<i64>) -> Result<ListModel> {
        let active = ListActiveModel {
            name: Set(name.to_string()),
            folder_id: Set(folder_id),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };
        Ok(active.insert(self.base.db.as_ref()).await?)
    }

    async fn rename(&self, id: i64, name: &str) -> Result<ListModel> {
        let mut active = ListActiveModel {
            id: Set(id),
            ..Default::default()
        };
        active.name = Set(name.to_string());
        Ok(active.update(self.base.db.as_ref()).await?)
    }

    async fn set_folder(&self, id: i64, folder_id: Option<i64>) -> Result<ListModel> {
        let mut active = ListActiveModel {
            id: Set(id),
            ..Default::default()
        };
        active.folder_id = Set(folder_id);
        Ok(active.update(self.base.db.as_ref()).await?)
    }

    async fn find_items(&self, list_id: i64) -> Result<Vec<ListItemModel>> {
        Ok(ListItem::find()
            .filter(list_items::Column::ListId.eq(list_id))
            .order_by_asc(list_items::Column::Position)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn find_item(
        &self,
        list_id: i64,
        media_item_id: i64,
    ) -> Result<Option<ListItemModel>> {
        Ok(ListItem::find()
            .filter(list_items::Column::ListId.eq(list_id))
            .filter(list_items::Column::MediaItemId.eq(media_item_id))
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn max_position(&self, list_id: i64) -> Result<Option<i64>> {
        let row = ListItem::find()
            .filter(list_items::Column::ListId.eq(list_id))
            .order_by_desc(list_items::Column::Position)
            .limit(1)
            .one(self.base.db.as_ref())
            .await?;
        Ok(row.map(|item| item.position))
    }

    async fn delete_item(&self, list_item_id: i64) -> Result<()> {
        ListItem::delete_by_id(list_item_id)
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    async fn count_items(&self, list_id: i64) -> Result<u64> {
        Ok(ListItem::find()
            .filter(list_items::Column::ListId.eq(list_id))
            .count(self.base.db.as_ref())
            .await?)
    }
}
