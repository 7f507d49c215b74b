use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Singleton row (id = 1) holding the remote bearer credentials.
/// A missing `expires_at` means the token is permanent.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "auth_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub access_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    pub server_url: Option<String>,
    pub user_id: Option<String>,
    pub expires_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
