//! REST access to the notifications backend.

mod client;

use async_trait::async_trait;
use thiserror::Error;

pub use client::NotificationsClient;

use crate::notifications::{NewNotification, Notification, NotificationPage, NotificationQuery};

/// Errors returned by notification API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("Failed to reach the notification service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Text to show to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::InvalidRequest(_) => None,
        }
    }
}

/// Notification endpoints consumed by the pipeline.
#[async_trait]
pub trait NotificationsApi: Send + Sync {
    /// `GET /notifications`
    async fn list(&self, query: &NotificationQuery) -> Result<NotificationPage, ApiError>;

    /// `POST /notifications`
    async fn create(&self, new: &NewNotification) -> Result<Notification, ApiError>;

    /// `PATCH /notifications/:id/read`
    async fn mark_read(&self, id: &str) -> Result<(), ApiError>;

    /// `PATCH /notifications/read-all`
    async fn mark_all_read(&self) -> Result<(), ApiError>;

    /// `DELETE /notifications/:id`
    async fn delete(&self, id: &str) -> Result<(), ApiError>;

    /// `DELETE /notifications`
    async fn clear(&self) -> Result<(), ApiError>;
}
