//! Keyword search over the indexed items, with ranked results and automatic
//! capture of every executed query into the Search History folder.

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::DatabaseConnection;
use crate::db::entities::{List, ListActiveModel, lists};
use crate::db::repository::Repository;
use crate::db::repository::folder_repository::{FolderRepository, FolderRepositoryImpl};
use crate::db::repository::list_repository::ListRepositoryImpl;
use crate::db::repository::media_repository::MediaRepositoryImpl;
use crate::models::{SearchMatch, SearchScope};
use crate::utils::normalize;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query contains no keywords after normalization")]
    EmptyQuery,
    #[error("search history folder missing")]
    HistoryFolderMissing,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub scope: SearchScope,
    pub match_mode: SearchMatch,
    pub page_size: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scope: SearchScope::default(),
            match_mode: SearchMatch::default(),
            page_size: 50,
        }
    }

    /// Query using the user's configured scope and match mode.
    pub fn with_defaults(text: impl Into<String>, config: &crate::config::SearchConfig) -> Self {
        Self {
            text: text.into(),
            scope: config.default_scope,
            match_mode: config.default_match,
            page_size: 50,
        }
    }
}

/// Ranked result plus the history list the query was captured into.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub item_ids: Vec<i64>,
    pub keywords: Vec<String>,
    pub history_list_id: i64,
}

/// Rank tiers, best first. Within a tier results order by folded title.
const TIER_TITLE_ALL: u8 = 1;
const TIER_TITLE_SOME: u8 = 2;
const TIER_PLOT_ALL: u8 = 3;
const TIER_PLOT_SOME: u8 = 4;

pub struct SearchEngine {
    db: DatabaseConnection,
    media: MediaRepositoryImpl,
    folders: FolderRepositoryImpl,
}

impl SearchEngine {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            media: MediaRepositoryImpl::new(db.clone()),
            folders: FolderRepositoryImpl::new(db.clone()),
            db,
        }
    }

    /// Evaluate a keyword query and capture it as a history list.
    pub async fn execute(&self, query: &SearchQuery) -> Result<SearchOutcome, SearchError> {
        let keywords = normalize::keywords(&query.text);
        if keywords.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        debug!(?keywords, scope = ?query.scope, mode = ?query.match_mode, "Executing search");

        let mut hits: Vec<(u8, String, i64)> = Vec::new();
        for item in self.media.find_all().await? {
            let folded_title = normalize::fold(&item.title);
            let folded_plot = item.plot.as_deref().map(normalize::fold);

            let in_title: Vec<bool> = keywords
                .iter()
                .map(|kw| query.scope.includes_title() && folded_title.contains(kw.as_str()))
                .collect();
            let in_plot: Vec<bool> = keywords
                .iter()
                .map(|kw| {
                    query.scope.includes_plot()
                        && folded_plot
                            .as_deref()
                            .map(|plot| plot.contains(kw.as_str()))
                            .unwrap_or(false)
                })
                .collect();

            let matched = match query.match_mode {
                SearchMatch::All => in_title
                    .iter()
                    .zip(&in_plot)
                    .all(|(title, plot)| *title || *plot),
                SearchMatch::Any => in_title
                    .iter()
                    .zip(&in_plot)
                    .any(|(title, plot)| *title || *plot),
            };
            if !matched {
                continue;
            }

            // Title-complete beats plot-complete beats split matches. A
            // partial title hit only earns its own tier under any-match;
            // under all-match the item needed plot to qualify at all.
            let tier = if in_title.iter().all(|hit| *hit) {
                TIER_TITLE_ALL
            } else if query.match_mode == SearchMatch::Any && in_title.iter().any(|hit| *hit) {
                TIER_TITLE_SOME
            } else if in_plot.iter().all(|hit| *hit) {
                TIER_PLOT_ALL
            } else {
                TIER_PLOT_SOME
            };
            hits.push((tier, folded_title, item.id));
        }

        hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        hits.truncate(query.page_size);
        let item_ids: Vec<i64> = hits.iter().map(|(_, _, id)| *id).collect();

        let history_list_id = self.capture(&keywords, &item_ids).await?;
        info!(
            results = item_ids.len(),
            history_list_id,
            "Search complete"
        );

        Ok(SearchOutcome {
            item_ids,
            keywords,
            history_list_id,
        })
    }

    /// Transactionally (re)create the `Search: <keywords>` list under the
    /// reserved folder, positions following result rank. Re-running the same
    /// query replaces its previous capture.
    async fn capture(&self, keywords: &[String], item_ids: &[i64]) -> Result<i64, SearchError> {
        let folder_id = self
            .folders
            .find_by_name_and_parent(crate::constants::SEARCH_HISTORY_FOLDER, None)
            .await?
            .ok_or(SearchError::HistoryFolderMissing)?
            .id;
        let name = format!("Search: {}", keywords.join(" "));

        let txn = self.db.begin().await.map_err(anyhow::Error::from)?;

        List::delete_many()
            .filter(lists::Column::FolderId.eq(folder_id))
            .filter(lists::Column::Name.eq(name.as_str()))
            .exec(&txn)
            .await
            .map_err(anyhow::Error::from)?;

        let list = ListActiveModel {
            name: Set(name),
            folder_id: Set(Some(folder_id)),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(anyhow::Error::from)?;

        for (rank, media_item_id) in item_ids.iter().enumerate() {
            ListRepositoryImpl::insert_item_in(&txn, list.id, *media_item_id, (rank + 1) as i64)
                .await?;
        }

        txn.commit().await.map_err(anyhow::Error::from)?;
        Ok(list.id)
    }
}
