//! User notifications: wire models, the client-side store and the service
//! that keeps it in sync with the server.

mod models;
mod service;
mod state;
mod store;

pub use models::{
    EntityKind, NewNotification, Notification, NotificationCategory, NotificationId,
    NotificationPage, NotificationQuery, ReadFilter, RelatedEntity, SortOrder,
};
pub use service::NotificationService;
pub use state::{FetchTicket, NotificationState, StoreAction};
pub use store::{FetchOutcome, NotificationStore, StoreSnapshot};
