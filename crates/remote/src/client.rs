//! Reqwest-based client for the sync server's REST endpoints.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use fieldsync_core::{AttachPayload, ClientFormPayload, FormRecord, OfflineSnapshot};

use crate::api::SyncApi;
use crate::error::{RemoteSyncError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Error envelope returned by the server on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Body of `GET /sync/forms?since=`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullFormsResponse {
    pub forms: Vec<FormRecord>,
}

/// Body of `POST /sync/forms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertFormsRequest {
    pub forms: Vec<ClientFormPayload>,
}

/// Client for the sync server. Thin request layer only; retry and fallback
/// policy belong to the scheduler and orchestrator.
#[derive(Debug, Clone)]
pub struct RemoteSyncClient {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteSyncClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the sync API (e.g., "https://api.fieldsync.example")
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create headers for an API request.
    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| RemoteSyncError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    fn error_from_body(status: reqwest::StatusCode, body: &str) -> RemoteSyncError {
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
            if !error.code.is_empty() || !error.message.is_empty() {
                return RemoteSyncError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                );
            }
        }
        RemoteSyncError::api(status.as_u16(), format!("Request failed: {}", body))
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::error_from_body(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            RemoteSyncError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Check a response that carries no meaningful body.
    async fn expect_success(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            debug!("API response status: {}", status);
            return Ok(());
        }
        let body = response.text().await?;
        Self::log_response(status, &body);
        Err(Self::error_from_body(status, &body))
    }
}

#[async_trait]
impl SyncApi for RemoteSyncClient {
    /// GET /sync/snapshot
    async fn fetch_snapshot(&self, token: &str) -> Result<OfflineSnapshot> {
        let url = format!("{}/sync/snapshot", self.base_url);
        debug!("Fetching full snapshot");

        let response = self
            .client
            .get(&url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// GET /sync/forms?since={epoch-ms}
    async fn pull_forms_since(&self, token: &str, since_ms: i64) -> Result<Vec<FormRecord>> {
        let url = format!("{}/sync/forms", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(token)?)
            .query(&[("since", since_ms.to_string())])
            .send()
            .await?;

        let body: PullFormsResponse = Self::parse_response(response).await?;
        Ok(body.forms)
    }

    /// POST /sync/forms
    async fn upsert_forms(
        &self,
        token: &str,
        forms: Vec<ClientFormPayload>,
    ) -> Result<Vec<FormRecord>> {
        let url = format!("{}/sync/forms", self.base_url);
        debug!("Upserting {} form(s)", forms.len());

        let response = self
            .client
            .post(&url)
            .headers(self.headers(token)?)
            .json(&UpsertFormsRequest { forms })
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// PATCH /forms/{id}/attach
    async fn attach_form(
        &self,
        token: &str,
        form_id: &str,
        payload: &AttachPayload,
    ) -> Result<FormRecord> {
        let url = format!("{}/forms/{}/attach", self.base_url, form_id);

        let response = self
            .client
            .patch(&url)
            .headers(self.headers(token)?)
            .json(payload)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// DELETE /forms/{id}
    async fn delete_form(&self, token: &str, form_id: &str) -> Result<()> {
        let url = format!("{}/forms/{}", self.base_url, form_id);

        let response = self
            .client
            .delete(&url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        Self::expect_success(response).await
    }
}
