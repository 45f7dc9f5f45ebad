use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::types::{
    EntriesPage, EntryStatus, EntryStatusUpdate, ErrorBody, Feed, FeedRulesUpdate,
};
use crate::settings::Settings;

/// Version segment inserted between the base URL and every endpoint path.
pub const API_VERSION: &str = "v1";

/// Header carrying the API token.
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest response body accepted (10 MB). A full page of entries with
/// content is well under this.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Errors returned by [`MinifluxClient`] calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response.
    #[error("HTTP {status} {status_text}")]
    Status {
        status: u16,
        /// Canonical reason phrase for the status code.
        status_text: String,
        /// `error_message` from the response body, when present.
        message: Option<String>,
    },
    /// Connection, TLS or body transfer failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    /// 2xx response whose body did not match the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Most specific human-readable detail: the server message when it sent
    /// one, otherwise the status text or transport error.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Status {
                status,
                status_text,
                message,
            } => match message.as_deref().filter(|m| !m.trim().is_empty()) {
                Some(m) => m.to_string(),
                None if status_text.is_empty() => status.to_string(),
                None => status_text.clone(),
            },
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Build a versioned endpoint URL.
///
/// Trailing `/` on the base path is ignored, so `https://host/rss` and
/// `https://host/rss/` both yield `https://host/rss/v1/feeds/1` for `/feeds/1`.
/// Query and fragment of the base are dropped.
pub fn build_endpoint(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    url.set_query(None);
    url.set_fragment(None);
    let base_path = url.path().trim_end_matches('/').to_string();
    let path = path.trim_start_matches('/');
    url.set_path(&format!("{base_path}/{API_VERSION}/{path}"));
    url
}

/// Authenticated client for one operation's worth of calls.
///
/// Built from freshly loaded [`Settings`]; never kept across user actions.
pub struct MinifluxClient {
    http: reqwest::Client,
    settings: Settings,
    timeout: Duration,
    max_body_bytes: usize,
}

impl MinifluxClient {
    pub fn new(http: reqwest::Client, settings: Settings) -> Self {
        Self {
            http,
            settings,
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    /// Deadline for a whole exchange: connect, headers and body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn endpoint(&self, path: &str) -> Url {
        build_endpoint(self.settings.api_base_url(), path)
    }

    /// `GET /feeds/{id}`
    pub async fn get_feed(&self, feed_id: i64) -> Result<Feed, ApiError> {
        let url = self.endpoint(&format!("/feeds/{feed_id}"));
        self.fetch_json(self.http.get(url)).await
    }

    /// `PUT /feeds/{id}` with only the fields set in `update`.
    pub async fn update_feed_rules(
        &self,
        feed_id: i64,
        update: &FeedRulesUpdate,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/feeds/{feed_id}"));
        self.send(self.http.put(url).json(update)).await
    }

    /// `GET /feeds/{id}/entries?status=unread&limit=..&offset=..`
    pub async fn unread_feed_entries(
        &self,
        feed_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<EntriesPage, ApiError> {
        let mut url = self.endpoint(&format!("/feeds/{feed_id}/entries"));
        url.query_pairs_mut()
            .append_pair("status", "unread")
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.fetch_json(self.http.get(url)).await
    }

    /// `GET /entries?status=unread`, newest first.
    pub async fn unread_entries(&self, limit: u32) -> Result<EntriesPage, ApiError> {
        let mut url = self.endpoint("/entries");
        url.query_pairs_mut()
            .append_pair("status", "unread")
            .append_pair("limit", &limit.to_string())
            .append_pair("order", "published_at")
            .append_pair("direction", "desc");
        self.fetch_json(self.http.get(url)).await
    }

    /// `PUT /entries` setting every id in `entry_ids` to read, in one request.
    pub async fn mark_entries_read(&self, entry_ids: &[i64]) -> Result<(), ApiError> {
        let url = self.endpoint("/entries");
        let body = EntryStatusUpdate {
            entry_ids,
            status: EntryStatus::Read,
        };
        self.send(self.http.put(url).json(&body)).await
    }

    /// Send `request` and read the success body, all under one deadline.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let request = request.header(AUTH_HEADER, self.settings.api_key().expose_secret());
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| ApiError::Timeout(self.timeout))?
    }

    async fn exchange(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return read_limited_bytes(response, self.max_body_bytes).await;
        }

        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let message = match read_limited_bytes(response, self.max_body_bytes).await {
            Ok(body) => serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error_message),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read error body");
                None
            }
        };
        tracing::debug!(
            status = status.as_u16(),
            message = message.as_deref().unwrap_or(""),
            "API request rejected"
        );
        Err(ApiError::Status {
            status: status.as_u16(),
            status_text,
            message,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(), ApiError> {
        self.execute(request).await.map(|_| ())
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Read a response body, refusing anything over `limit` bytes.
///
/// Checks `Content-Length` first, then counts chunks as they arrive so a
/// missing or wrong header cannot bypass the cap.
async fn read_limited_bytes(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ApiError> {
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(ApiError::TooLarge { limit });
        }
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if bytes.len() + chunk.len() > limit {
            return Err(ApiError::TooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
