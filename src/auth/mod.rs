//! Pair-code token lifecycle: exchange, validation, refresh, persistence.
//!
//! Tokens never reach the log surface whole; every log line goes through
//! redaction first.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{HTTP_CONNECT_TIMEOUT, HTTP_TOTAL_TIMEOUT, TOKEN_REFRESH_WINDOW};
use crate::db::DatabaseConnection;
use crate::db::entities::AuthStateModel;
use crate::db::repository::auth_repository::AuthRepositoryImpl;
use crate::utils::redact_token;

#[derive(Debug, Serialize)]
struct PairRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct PairResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    user_id: String,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Credentials ready for use by the reconciler.
#[derive(Debug, Clone)]
pub struct ActiveCredentials {
    pub access_token: String,
    pub token_type: String,
    pub server_url: String,
}

pub struct AuthManager {
    repo: AuthRepositoryImpl,
    client: reqwest::Client,
}

impl AuthManager {
    pub fn new(db: DatabaseConnection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_TOTAL_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            repo: AuthRepositoryImpl::new(db),
            client,
        })
    }

    /// Exchange an 8-character pair code for a bearer token, validate it
    /// against the whoami endpoint, and persist the result.
    pub async fn pair(&self, server_url: &str, code: &str) -> Result<AuthStateModel> {
        let code = code.trim();
        if code.len() != 8 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(anyhow!("Pair code must be 8 alphanumeric characters"));
        }
        let server_url = server_url.trim_end_matches('/');

        let response = self
            .client
            .post(format!("{server_url}/auth/pair"))
            .json(&PairRequest { code })
            .send()
            .await
            .context("Pairing request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Pairing rejected: {status} - {body}"));
        }
        let pair: PairResponse = response
            .json()
            .await
            .context("Failed to parse pairing response")?;

        let whoami = self
            .whoami(server_url, &pair.token_type, &pair.access_token)
            .await
            .context("Token validation failed")?;

        let expires_at = pair
            .expires_in
            .map(|secs| (Utc::now() + chrono::Duration::seconds(secs)).naive_utc());
        let scope = whoami.scope.or(pair.scope);

        let state = self
            .repo
            .save(
                &pair.access_token,
                &pair.token_type,
                scope.as_deref(),
                server_url,
                Some(&whoami.user_id),
                expires_at,
            )
            .await?;
        info!(
            user_id = %whoami.user_id,
            token = %redact_token(&pair.access_token),
            "Paired with remote"
        );
        Ok(state)
    }

    /// Current credentials if a token is stored, refreshing first when it is
    /// within the expiry window. Returns `None` when unpaired or when a
    /// required refresh failed (state is cleared in that case).
    pub async fn ensure_fresh(&self) -> Result<Option<ActiveCredentials>> {
        let state = self.repo.get_or_init().await?;
        let (Some(token), Some(server_url)) = (state.access_token.clone(), state.server_url.clone())
        else {
            return Ok(None);
        };

        let needs_refresh = match state.expires_at {
            // No expiry means the token is permanent.
            None => false,
            Some(expires_at) => {
                let threshold = Utc::now().naive_utc()
                    + chrono::Duration::from_std(TOKEN_REFRESH_WINDOW).unwrap_or_default();
                threshold > expires_at
            }
        };

        if !needs_refresh {
            return Ok(Some(ActiveCredentials {
                access_token: token,
                token_type: state.token_type,
                server_url,
            }));
        }

        match self.refresh(&server_url, &state.token_type, &token).await {
            Ok(refreshed) => {
                let expires_at = refreshed
                    .expires_in
                    .map(|secs| (Utc::now() + chrono::Duration::seconds(secs)).naive_utc());
                let saved = self
                    .repo
                    .save(
                        &refreshed.access_token,
                        &refreshed.token_type,
                        state.scope.as_deref(),
                        &server_url,
                        state.user_id.as_deref(),
                        expires_at,
                    )
                    .await?;
                info!(
                    token = %redact_token(&refreshed.access_token),
                    "Refreshed access token"
                );
                Ok(Some(ActiveCredentials {
                    access_token: refreshed.access_token,
                    token_type: saved.token_type,
                    server_url,
                }))
            }
            Err(e) => {
                warn!("Token refresh failed, clearing credentials: {e:#}");
                self.repo.clear().await?;
                Ok(None)
            }
        }
    }

    /// Forget stored credentials.
    pub async fn unpair(&self) -> Result<()> {
        self.repo.clear().await
    }

    async fn whoami(
        &self,
        server_url: &str,
        token_type: &str,
        access_token: &str,
    ) -> Result<WhoamiResponse> {
        let response = self
            .client
            .get(format!("{server_url}/auth/whoami"))
            .header("Authorization", format!("{token_type} {access_token}"))
            .send()
            .await
            .context("Whoami request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("Whoami rejected: {}", response.status()));
        }
        response
            .json()
            .await
            .context("Failed to parse whoami response")
    }

    async fn refresh(
        &self,
        server_url: &str,
        token_type: &str,
        access_token: &str,
    ) -> Result<RefreshResponse> {
        let response = self
            .client
            .post(format!("{server_url}/auth/refresh"))
            .header("Authorization", format!("{token_type} {access_token}"))
            .send()
            .await
            .context("Refresh request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("Refresh rejected: {}", response.status()));
        }
        response
            .json()
            .await
            .context("Failed to parse refresh response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;

    #[tokio::test]
    async fn pair_exchanges_code_and_records_identity() {
        let db = memory_db().await;
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/pair")
            .match_body(mockito::Matcher::Json(serde_json::json!({"code": "ABCD1234"})))
            .with_body(r#"{"access_token":"tok-secret-9999","token_type":"Bearer"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/auth/whoami")
            .match_header("Authorization", "Bearer tok-secret-9999")
            .with_body(r#"{"user_id":"u1","scope":"library"}"#)
            .create_async()
            .await;

        let auth = AuthManager::new(db.clone()).unwrap();
        let state = auth.pair(&server.url(), "ABCD1234").await.unwrap();
        assert_eq!(state.access_token.as_deref(), Some("tok-secret-9999"));
        assert_eq!(state.user_id.as_deref(), Some("u1"));
        assert_eq!(state.scope.as_deref(), Some("library"));
        // No expiry: treated as permanent.
        assert!(state.expires_at.is_none());

        let creds = auth.ensure_fresh().await.unwrap().unwrap();
        assert_eq!(creds.access_token, "tok-secret-9999");
    }

    #[tokio::test]
    async fn malformed_code_rejected_before_any_request() {
        let db = memory_db().await;
        let auth = AuthManager::new(db).unwrap();
        assert!(auth.pair("http://localhost:1", "short").await.is_err());
        assert!(auth.pair("http://localhost:1", "has space").await.is_err());
    }

    #[tokio::test]
    async fn near_expiry_token_is_refreshed() {
        let db = memory_db().await;
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .match_header("Authorization", "Bearer old-token")
            .with_body(r#"{"access_token":"new-token","token_type":"Bearer","expires_in":3600}"#)
            .create_async()
            .await;

        let repo = AuthRepositoryImpl::new(db.clone());
        let soon = (Utc::now() + chrono::Duration::seconds(60)).naive_utc();
        repo.save(
            "old-token",
            "Bearer",
            None,
            &server.url(),
            Some("u1"),
            Some(soon),
        )
        .await
        .unwrap();

        let auth = AuthManager::new(db).unwrap();
        let creds = auth.ensure_fresh().await.unwrap().unwrap();
        assert_eq!(creds.access_token, "new-token");
    }

    #[tokio::test]
    async fn failed_refresh_clears_state() {
        let db = memory_db().await;
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(401)
            .create_async()
            .await;

        let repo = AuthRepositoryImpl::new(db.clone());
        let soon = (Utc::now() + chrono::Duration::seconds(60)).naive_utc();
        repo.save("old-token", "Bearer", None, &server.url(), None, Some(soon))
            .await
            .unwrap();

        let auth = AuthManager::new(db.clone()).unwrap();
        assert!(auth.ensure_fresh().await.unwrap().is_none());
        assert!(repo.get_or_init().await.unwrap().access_token.is_none());
    }

    #[tokio::test]
    async fn unpaired_state_yields_no_credentials() {
        let db = memory_db().await;
        let auth = AuthManager::new(db).unwrap();
        assert!(auth.ensure_fresh().await.unwrap().is_none());
    }
}
