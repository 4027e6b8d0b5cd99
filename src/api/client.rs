//! HTTP client for the notifications REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, IntoUrl, Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use tracing::debug;

use super::{ApiError, NotificationsApi};
use crate::auth::Credential;
use crate::notifications::{NewNotification, Notification, NotificationPage, NotificationQuery};

/// Error body shape used by the backend (`{"message": ...}` or `{"error": ...}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

pub struct NotificationsClient {
    client: Client,
    base_url: String,
    credential: Option<Credential>,
}

impl NotificationsClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the API (e.g., "http://localhost:3000/api")
    /// * `credential` - Bearer credential sent with every request, if any
    /// * `timeout` - Per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        credential: Option<Credential>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            credential,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credential {
            Some(credential) => builder.bearer_auth(credential.token()),
            None => builder,
        }
    }

    /// `/notifications/{id}[/{action}]` with `id` percent-encoded as a single
    /// path segment.
    fn notification_url(&self, id: &str, action: Option<&str>) -> Result<Url, ApiError> {
        if id.is_empty() || id == "." || id == ".." {
            return Err(ApiError::InvalidRequest(format!(
                "invalid notification id '{}'",
                id
            )));
        }
        let mut url = Url::parse(&self.url("/notifications"))
            .map_err(|e| ApiError::InvalidRequest(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest("base URL cannot have a path".to_string()))?
            .push(id)
            .extend(action);
        Ok(url)
    }

    /// Turn a non-success response into `ApiError::Server` carrying the
    /// server's own message when it sent one.
    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let fallback = status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message.or(body.error).unwrap_or(fallback),
            Err(_) => fallback,
        };
        debug!("Notification API returned {}: {}", status, message);

        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl NotificationsApi for NotificationsClient {
    async fn list(&self, query: &NotificationQuery) -> Result<NotificationPage, ApiError> {
        let response = self
            .request(Method::GET, self.url("/notifications"))
            .query(&query.to_params())
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn create(&self, new: &NewNotification) -> Result<Notification, ApiError> {
        let response = self
            .request(Method::POST, self.url("/notifications"))
            .json(new)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .request(Method::PATCH, self.notification_url(id, Some("read"))?)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        let response = self
            .request(Method::PATCH, self.url("/notifications/read-all"))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, self.notification_url(id, None)?)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, self.url("/notifications"))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
