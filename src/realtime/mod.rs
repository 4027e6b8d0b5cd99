//! Real-time push channel: connection lifecycle, event types and the
//! subscription registry that fans inbound events out to listeners.

pub mod connection;
pub mod events;
pub mod reconnect_policy;
pub mod registry;

use std::time::Duration;

use thiserror::Error;

pub use connection::{ConnectionManager, ConnectionState, RealtimeSettings};
pub use events::{ClientEvent, EventKind, ServerEvent};
pub use reconnect_policy::ReconnectPolicy;
pub use registry::{DispatchReport, Subscription, SubscriptionRegistry};

/// Errors raised by the push channel.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("No credential available, sign in first")]
    MissingCredential,

    #[error("Credential rejected by the server")]
    Unauthorized,

    #[error("Credential cannot be sent as a header")]
    InvalidCredential,

    #[error("Invalid push channel URL: {0}")]
    InvalidUrl(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Connection attempt failed: {0}")]
    ConnectFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection attempt cancelled")]
    Cancelled,
}

impl RealtimeError {
    /// Whether an automatic reconnect may follow this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RealtimeError::Timeout(_)
                | RealtimeError::Handshake(_)
                | RealtimeError::ConnectFailed(_)
        )
    }
}
