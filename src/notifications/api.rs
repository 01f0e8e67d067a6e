//! REST client for the dashboard notifications API.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use super::models::{NotificationId, NotificationPage, UnreadCount};
use crate::metrics;
use crate::session::CredentialsProvider;

/// Errors returned by notification API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No bearer token available")]
    Unauthenticated,

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// True when the server rejected our credentials.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ApiError::Unauthenticated)
            || matches!(self, ApiError::Status { status, .. } if *status == 401 || *status == 403)
    }
}

/// The notification CRUD operations this client consumes.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// List notifications, newest first. `page` starts at 1.
    async fn list(&self, page: u32, limit: u32) -> Result<NotificationPage, ApiError>;

    /// Get the number of unread notifications.
    async fn unread_count(&self) -> Result<u64, ApiError>;

    /// Mark a single notification as read.
    async fn mark_read(&self, id: NotificationId) -> Result<(), ApiError>;

    /// Mark every notification of the user as read.
    async fn mark_all_read(&self) -> Result<(), ApiError>;

    /// Delete a single notification.
    async fn delete(&self, id: NotificationId) -> Result<(), ApiError>;
}

/// HTTP implementation of [`NotificationApi`].
pub struct HttpNotificationApi {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialsProvider>,
}

impl HttpNotificationApi {
    /// Create a new API client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the dashboard server (e.g., "https://dash.example.com")
    /// * `timeout_sec` - Request timeout in seconds
    /// * `credentials` - Source of the bearer token attached to every request
    pub fn new(
        base_url: String,
        timeout_sec: u64,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .user_agent(format!(
                "dashboard-notifications/{}-{}",
                env!("APP_VERSION"),
                env!("GIT_HASH")
            ))
            .build()
            .expect("Failed to create HTTP client");

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Self {
            client,
            base_url,
            credentials,
        }
    }

    /// Get the base URL of the dashboard server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/notifications{}", self.base_url, path)
    }

    /// Attach the bearer token, send, and map non-success statuses to errors.
    async fn execute(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        let token = self
            .credentials
            .current_token()
            .ok_or(ApiError::Unauthenticated)?;

        let started = Instant::now();
        let result = request.bearer_auth(token).send().await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::record_api_request(operation, false, started.elapsed());
                return Err(ApiError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        metrics::record_api_request(operation, status.is_success(), started.elapsed());
        debug!("{} -> {}", operation, status);

        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ApiError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list(&self, page: u32, limit: u32) -> Result<NotificationPage, ApiError> {
        let request = self
            .client
            .get(self.url(""))
            .query(&[("page", page), ("limit", limit)]);
        let response = self.execute("list", request).await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        let request = self.client.get(self.url("/unread-count"));
        let response = self.execute("unread_count", request).await?;

        let body: UnreadCount = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(body.count)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<(), ApiError> {
        let request = self.client.put(self.url(&format!("/{}/read", id)));
        self.execute("mark_read", request).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        let request = self.client.put(self.url("/read-all"));
        self.execute("mark_all_read", request).await?;
        Ok(())
    }

    async fn delete(&self, id: NotificationId) -> Result<(), ApiError> {
        let request = self.client.delete(self.url(&format!("/{}", id)));
        self.execute("delete", request).await?;
        Ok(())
    }
}
