use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::SyncApiError;
use crate::constants::{HTTP_CONNECT_TIMEOUT, HTTP_TOTAL_TIMEOUT};
use crate::models::ImdbId;

/// Response of the version probe.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub etag: String,
    #[serde(default)]
    pub item_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdsPage {
    pub imdb_ids: Vec<String>,
    pub version: String,
    pub etag: String,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
}

/// Paged ids fetch result; `NotModified` mirrors an HTTP 304 on the etag.
#[derive(Debug, Clone)]
pub enum IdsResponse {
    NotModified,
    Page(IdsPage),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerItemStatus {
    pub imdb_id: String,
    pub status: String,
}

/// Response of an add or remove mutation; counters the server did not send
/// default to zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MutationResponse {
    #[serde(default)]
    pub added: u64,
    #[serde(default)]
    pub already_present: u64,
    #[serde(default)]
    pub removed: u64,
    #[serde(default)]
    pub not_found: u64,
    #[serde(default)]
    pub invalid: u64,
    #[serde(default)]
    pub per_item_status: Vec<PerItemStatus>,
    pub version: String,
    pub etag: String,
    #[serde(default)]
    pub item_count: u64,
}

#[derive(Debug, Serialize)]
struct MutationRequest<'a> {
    imdb_ids: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ConflictBody {
    #[serde(default)]
    retry_after_ms: Option<u64>,
}

/// Typed client for the remote library endpoints. Transport details beyond
/// timeouts are reqwest's problem; retry policy is the caller's.
#[derive(Clone)]
pub struct SyncApi {
    client: reqwest::Client,
    base_url: String,
    token_type: String,
    access_token: String,
}

impl SyncApi {
    pub fn new(base_url: &str, token_type: &str, access_token: &str) -> Result<Self, SyncApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_TOTAL_TIMEOUT)
            .build()
            .map_err(SyncApiError::from_reqwest)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_type: token_type.to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn auth_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub async fn get_version(&self) -> Result<VersionInfo, SyncApiError> {
        let url = format!("{}/library/version", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(SyncApiError::from_reqwest)?;
        Self::parse_json(response).await
    }

    /// One page of the authoritative server id set. A 304 against
    /// `if_none_match` means the caller's cached set is still current.
    pub async fn get_ids_page(
        &self,
        page: u32,
        page_size: usize,
        if_none_match: Option<&str>,
    ) -> Result<IdsResponse, SyncApiError> {
        let url = format!(
            "{}/library/ids?page={}&page_size={}",
            self.base_url, page, page_size
        );
        let mut request = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header());
        if let Some(etag) = if_none_match {
            request = request.header("If-None-Match", etag);
        }
        let response = request.send().await.map_err(SyncApiError::from_reqwest)?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("Server ids unchanged (304)");
            return Ok(IdsResponse::NotModified);
        }
        Ok(IdsResponse::Page(Self::parse_json(response).await?))
    }

    pub async fn add(
        &self,
        ids: &[ImdbId],
        idempotency_key: &str,
    ) -> Result<MutationResponse, SyncApiError> {
        self.mutate("add", ids, idempotency_key).await
    }

    pub async fn remove(
        &self,
        ids: &[ImdbId],
        idempotency_key: &str,
    ) -> Result<MutationResponse, SyncApiError> {
        self.mutate("remove", ids, idempotency_key).await
    }

    async fn mutate(
        &self,
        action: &str,
        ids: &[ImdbId],
        idempotency_key: &str,
    ) -> Result<MutationResponse, SyncApiError> {
        let url = format!("{}/library/{}", self.base_url, action);
        let body = MutationRequest {
            imdb_ids: ids.iter().map(ImdbId::as_str).collect(),
        };
        debug!(action, count = ids.len(), idempotency_key, "Sending mutation");
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(SyncApiError::from_reqwest)?;
        Self::parse_json(response).await
    }

    async fn parse_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, SyncApiError> {
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            let retry_after_ms = serde_json::from_str::<ConflictBody>(&body)
                .ok()
                .and_then(|b| b.retry_after_ms);
            return Err(SyncApiError::from_status(
                status.as_u16(),
                body,
                retry_after,
                retry_after_ms,
            ));
        }
        let text = response
            .text()
            .await
            .map_err(SyncApiError::from_reqwest)?;
        serde_json::from_str(&text).map_err(|e| SyncApiError::ParseError(e.to_string()))
    }
}
