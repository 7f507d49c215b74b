use super::BaseRepository;
use crate::db::entities::{AuthState, AuthStateActiveModel, AuthStateModel};
use anyhow::Result;
use chrono::NaiveDateTime;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;

const SINGLETON_ID: i32 = 1;

#[derive(Debug)]
pub struct AuthRepositoryImpl {
    base: BaseRepository,
}

impl AuthRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn get_or_init(&self) -> Result<AuthStateModel> {
        if let Some(state) = AuthState::find_by_id(SINGLETON_ID)
            .one(self.base.db.as_ref())
            .await?
        {
            return Ok(state);
        }
        let active = AuthStateActiveModel {
            id: Set(SINGLETON_ID),
            access_token: Set(None),
            token_type: Set("Bearer".to_string()),
            scope: Set(None),
            server_url: Set(None),
            user_id: Set(None),
            expires_at: Set(None),
        };
        Ok(active.insert(self.base.db.as_ref()).await?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn save(
        &self,
        access_token: &str,
        token_type: &str,
        scope: Option<&str>,
        server_url: &str,
        user_id: Option<&str>,
        expires_at: Option<NaiveDateTime>,
    ) -> Result<AuthStateModel> {
        self.get_or_init().await?;
        let active = AuthStateActiveModel {
            id: Set(SINGLETON_ID),
            access_token: Set(Some(access_token.to_string())),
            token_type: Set(token_type.to_string()),
            scope: Set(scope.map(str::to_string)),
            server_url: Set(Some(server_url.to_string())),
            user_id: Set(user_id.map(str::to_string)),
            expires_at: Set(expires_at),
        };
        Ok(active.update(self.base.db.as_ref()).await?)
    }

    /// Drop credentials after a failed refresh or explicit unpair.
    pub async fn clear(&self) -> Result<()> {
        let current = self.get_or_init().await?;
        let mut active: AuthStateActiveModel = current.into();
        active.access_token = Set(None);
        active.scope = Set(None);
        active.user_id = Set(None);
        active.expires_at = Set(None);
        active.update(self.base.db.as_ref()).await?;
        Ok(())
    }
}
