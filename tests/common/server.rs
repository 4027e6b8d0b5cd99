//! Test server lifecycle management
//!
//! Each test gets an isolated reference server on a random port. When the
//! `TestServer` is dropped the server shuts down.

use super::constants::*;
use servicedesk_notifications::alerts::AlertCenter;
use servicedesk_notifications::config::{AppConfig, CliConfig, FileConfig, RealtimeConfig};
use servicedesk_notifications::notifications::{
    NewNotification, NotificationCategory, NotificationStore,
};
use servicedesk_notifications::server::{make_app, ServerState};
use servicedesk_notifications::{
    ConnectionManager, Credential, NotificationsClient, RealtimeSettings, ReconnectPolicy,
    SubscriptionRegistry,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Client-side components wired to a test server.
pub struct Pipeline {
    pub manager: ConnectionManager,
    pub registry: Arc<SubscriptionRegistry>,
    pub store: Arc<NotificationStore>,
    pub alerts: Arc<AlertCenter>,
}

pub struct TestServer {
    /// Base URL of the REST API (e.g., "http://127.0.0.1:12345/api")
    pub api_url: String,

    /// Push channel URL (e.g., "ws://127.0.0.1:12345/ws")
    pub ws_url: String,

    /// Server state for pushing events and flipping test switches
    pub state: ServerState,

    // Private fields - keep resources alive until drop
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with the two test users.
    pub async fn spawn() -> Self {
        let state = ServerState::new(HashMap::from([
            (USER_1_TOKEN.to_string(), USER_1_ID),
            (USER_2_TOKEN.to_string(), USER_2_ID),
        ]));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = make_app(state.clone());

        // The listener is already bound, so connections queue until the
        // task starts accepting them.
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            api_url: format!("http://127.0.0.1:{}/api", port),
            ws_url: format!("ws://127.0.0.1:{}/ws", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn credential(&self, token: &str) -> Credential {
        Credential::bearer(token)
    }

    pub fn test_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(TEST_RECONNECT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(TEST_RECONNECT_MAX_DELAY_MS),
            max_attempts: TEST_MAX_RECONNECT_ATTEMPTS,
        }
    }

    pub fn realtime_settings(&self) -> RealtimeSettings {
        RealtimeSettings {
            url: self.ws_url.clone(),
            policy: Self::test_policy(),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    /// Fresh client-side pipeline pointed at this server.
    pub fn pipeline(&self) -> Pipeline {
        let registry = Arc::new(SubscriptionRegistry::new());
        let store = Arc::new(NotificationStore::new());
        let alerts = Arc::new(AlertCenter::new());
        let manager = ConnectionManager::new(
            self.realtime_settings(),
            registry.clone(),
            store.clone(),
            alerts.clone(),
        );
        Pipeline {
            manager,
            registry,
            store,
            alerts,
        }
    }

    pub fn rest_client(&self, token: Option<&str>) -> NotificationsClient {
        NotificationsClient::new(
            self.api_url.clone(),
            token.map(Credential::bearer),
            Duration::from_secs(5),
        )
        .expect("Failed to build REST client")
    }

    /// Resolved configuration as the CLI would build it, with the fast
    /// test reconnect policy.
    pub fn app_config(&self, token: Option<&str>, user_id: u64) -> AppConfig {
        let cli = CliConfig {
            api_url: Some(self.api_url.clone()),
            token: token.map(str::to_string),
            user_id: Some(user_id),
            request_timeout_sec: 5,
            page_size: 20,
            ..Default::default()
        };
        let file = FileConfig {
            realtime: Some(RealtimeConfig {
                reconnect_base_delay_ms: Some(TEST_RECONNECT_BASE_DELAY_MS),
                reconnect_max_delay_ms: Some(TEST_RECONNECT_MAX_DELAY_MS),
                max_reconnect_attempts: Some(TEST_MAX_RECONNECT_ATTEMPTS),
                connect_timeout_sec: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        AppConfig::resolve(&cli, Some(file)).expect("Failed to resolve test config")
    }

    /// Waits until `count` connections joined the user's channel.
    pub async fn wait_for_channel(&self, user_id: u64, count: usize) {
        let hub = self.state.hub.clone();
        wait_until(|| {
            let hub = hub.clone();
            async move { hub.channel_size(user_id).await >= count }
        })
        .await;
    }

    /// Stores `count` notifications for the user without pushing them.
    pub fn seed(&self, user_id: u64, count: usize) {
        for i in 0..count {
            self.state.book.create(
                user_id,
                new_notification(&format!("Seeded {}", i), NotificationCategory::Info),
            );
        }
    }
}

pub fn new_notification(title: &str, category: NotificationCategory) -> NewNotification {
    NewNotification {
        title: title.to_string(),
        message: format!("{} (test)", title),
        category,
        related_entity: None,
    }
}

/// Polls `condition` until it holds, panicking after `EVENT_TIMEOUT_MS`.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(EVENT_TIMEOUT_MS);

    while !condition().await {
        if start.elapsed() > timeout {
            panic!("Condition not met within {}ms", EVENT_TIMEOUT_MS);
        }
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}

/// Synchronous flavour of [`wait_until`] for plain getters.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    wait_until(|| std::future::ready(condition())).await;
}
