use axum::extract::FromRef;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::book::NotificationBook;
use super::websocket::ChannelHub;
use crate::notifications::{NewNotification, Notification};
use crate::realtime::ServerEvent;

pub type GuardedNotificationBook = Arc<NotificationBook>;
pub type GuardedChannelHub = Arc<ChannelHub>;
pub type GuardedControls = Arc<ServerControls>;
pub type TokenTable = Arc<HashMap<String, u64>>;

/// Switches used to simulate an unhealthy push endpoint.
#[derive(Debug)]
pub struct ServerControls {
    handshakes: AtomicU64,
    accepting: AtomicBool,
}

impl Default for ServerControls {
    fn default() -> Self {
        Self {
            handshakes: AtomicU64::new(0),
            accepting: AtomicBool::new(true),
        }
    }
}

impl ServerControls {
    pub fn record_handshake(&self) -> u64 {
        self.handshakes.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Push-channel handshakes seen so far, rejected ones included.
    pub fn handshake_count(&self) -> u64 {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// When false, push handshakes are answered with 503.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub book: GuardedNotificationBook,
    pub hub: GuardedChannelHub,
    pub controls: GuardedControls,
    pub tokens: TokenTable,
}

impl ServerState {
    /// `tokens` maps bearer tokens to user ids.
    pub fn new(tokens: HashMap<String, u64>) -> Self {
        Self {
            book: Arc::new(NotificationBook::new()),
            hub: Arc::new(ChannelHub::new()),
            controls: Arc::new(ServerControls::default()),
            tokens: Arc::new(tokens),
        }
    }

    pub fn user_for_token(&self, token: &str) -> Option<u64> {
        self.tokens.get(token).copied()
    }

    /// Store a notification for `user_id` and push it to the user's channel.
    pub async fn push_notification(&self, user_id: u64, new: NewNotification) -> Notification {
        let notification = self.book.create(user_id, new);
        let delivered = self
            .hub
            .broadcast_to_user(user_id, ServerEvent::Notification(notification.clone()))
            .await;
        info!(
            "Pushed notification {} to user {} ({} connections)",
            notification.id, user_id, delivered
        );
        notification
    }

    /// Push an arbitrary event to the user's channel without storing anything.
    pub async fn push_event(&self, user_id: u64, event: ServerEvent) -> usize {
        self.hub.broadcast_to_user(user_id, event).await
    }

    /// Force-close every push connection, as a network failure would.
    pub async fn drop_connections(&self) -> usize {
        let dropped = self.hub.drop_all().await;
        info!("Dropped {} push connections", dropped);
        dropped
    }
}

impl FromRef<ServerState> for GuardedNotificationBook {
    fn from_ref(input: &ServerState) -> Self {
        input.book.clone()
    }
}

impl FromRef<ServerState> for GuardedChannelHub {
    fn from_ref(input: &ServerState) -> Self {
        input.hub.clone()
    }
}

impl FromRef<ServerState> for GuardedControls {
    fn from_ref(input: &ServerState) -> Self {
        input.controls.clone()
    }
}
