//! Service Desk notification pipeline.
//!
//! The client side keeps a push channel open to the backend, fans inbound
//! events out to subscribers and maintains a paginated notification store
//! with an unread counter. The `server` module is an in-memory backend that
//! speaks the same protocol.

pub mod alerts;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod notifications;
pub mod realtime;
pub mod server;

// Re-export commonly used types for convenience
pub use alerts::{AlertCenter, AlertLevel, Toast};
pub use api::{ApiError, NotificationsApi, NotificationsClient};
pub use auth::Credential;
pub use context::{NotificationContext, Session};
pub use notifications::{
    Notification, NotificationId, NotificationQuery, NotificationService, NotificationStore,
};
pub use realtime::{
    ConnectionManager, ConnectionState, EventKind, RealtimeError, RealtimeSettings,
    ReconnectPolicy, ServerEvent, SubscriptionRegistry,
};
