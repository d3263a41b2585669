//! HTTP client for the notification pull API.

use async_trait::async_trait;
use bestflow_shared::{ApiError, MarkAllReadResponse, NotificationPage, NotificationQuery, NotificationRecord, UnreadCount};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::auth_session::Credential;

/// The pull side of the notification subsystem.
#[async_trait]
pub trait NotificationApi: Send + Sync + 'static {
    /// One page of notifications, newest first.
    async fn list_notifications(&self, query: NotificationQuery) -> Result<NotificationPage, ApiError>;

    async fn unread_count(&self) -> Result<u64, ApiError>;

    /// Mark one notification read. Idempotent.
    async fn mark_read(&self, id: &str) -> Result<NotificationRecord, ApiError>;

    /// Mark everything read. Idempotent.
    async fn mark_all_read(&self) -> Result<MarkAllReadResponse, ApiError>;
}

/// HTTP client that authenticates with the current session's bearer token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credential: watch::Receiver<Option<Credential>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, credential: watch::Receiver<Option<Credential>>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            credential,
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.credential
            .borrow()
            .as_ref()
            .map(|c| c.expose().to_string())
            .ok_or(ApiError::Unauthenticated)
    }

    /// Authenticated GET
    pub async fn get_json<TRes: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<TRes, ApiError> {
        let token = self.bearer()?;
        let rb = self.client.get(self.url(path)).query(query).bearer_auth(token);
        Self::execute(rb).await
    }

    /// Authenticated PATCH without a body
    pub async fn patch_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let token = self.bearer()?;
        let rb = self.client.patch(self.url(path)).bearer_auth(token);
        Self::execute(rb).await
    }

    async fn execute<TRes: DeserializeOwned>(rb: reqwest::RequestBuilder) -> Result<TRes, ApiError> {
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            tracing::debug!(status, "pull API request failed");
            return Err(ApiError::Http { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }
}

#[async_trait]
impl NotificationApi for ApiClient {
    async fn list_notifications(&self, query: NotificationQuery) -> Result<NotificationPage, ApiError> {
        self.get_json("/notifications", &query.to_query_pairs()).await
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        let count: UnreadCount = self.get_json("/notifications/unread-count", &[]).await?;
        Ok(count.unread_count)
    }

    async fn mark_read(&self, id: &str) -> Result<NotificationRecord, ApiError> {
        let id = url::form_urlencoded::byte_serialize(id.as_bytes()).collect::<String>();
        self.patch_json(&format!("/notifications/{id}/read")).await
    }

    async fn mark_all_read(&self) -> Result<MarkAllReadResponse, ApiError> {
        self.patch_json("/notifications/read-all").await
    }
}
