//! Push-channel connection manager.
//!
//! Owns the single WebSocket to the server. A supervisor task runs the
//! session and, when the connection drops on its own, reconnects according
//! to the `ReconnectPolicy` until the attempt budget is spent.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{ClientEvent, ServerEvent};
use super::reconnect_policy::ReconnectPolicy;
use super::registry::SubscriptionRegistry;
use super::RealtimeError;
use crate::alerts::{AlertCenter, AlertLevel};
use crate::auth::Credential;
use crate::notifications::NotificationStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
/// An open socket plus the queue feeding its writer.
type OpenSession = (WsStream, mpsc::Receiver<ClientEvent>);

const OUTBOUND_BUFFER: usize = 64;

const UNAVAILABLE_BANNER: &str =
    "Real-time notifications are unavailable. Reconnect to resume live updates.";
const REJECTED_BANNER: &str = "Real-time notifications stopped: please sign in again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    /// WebSocket endpoint, e.g. `ws://localhost:3000/ws`.
    pub url: String,
    pub policy: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/ws".to_string(),
            policy: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(25),
        }
    }
}

enum SessionEnd {
    /// Stopped on request.
    Closed,
    /// Dropped by the server or the network.
    Lost(String),
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    settings: RealtimeSettings,
    registry: Arc<SubscriptionRegistry>,
    store: Arc<NotificationStore>,
    alerts: Arc<AlertCenter>,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    exhausted: AtomicBool,
    /// Bumped by `disconnect` so a connect racing with it is abandoned.
    generation: AtomicU64,
    last_error: Mutex<Option<String>>,
    credential: Mutex<Option<Credential>>,
    outbound: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    supervisor: Mutex<Option<Supervisor>>,
    channels: Mutex<Vec<u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the push channel. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        settings: RealtimeSettings,
        registry: Arc<SubscriptionRegistry>,
        store: Arc<NotificationStore>,
        alerts: Arc<AlertCenter>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                settings,
                registry,
                store,
                alerts,
                state,
                attempts: AtomicU32::new(0),
                exhausted: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                last_error: Mutex::new(None),
                credential: Mutex::new(None),
                outbound: Mutex::new(None),
                supervisor: Mutex::new(None),
                channels: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Open the push channel.
    ///
    /// Returns immediately if already connected, and waits for the outcome of
    /// an attempt that is already in flight instead of opening a second
    /// channel. A missing credential fails without touching the network.
    ///
    /// A transient failure is returned to the caller and also hands over to
    /// the background reconnect loop, which retries by policy and raises the
    /// banner once it gives up. Rejected credentials are never retried.
    pub async fn connect(&self, credential: Option<Credential>) -> Result<(), RealtimeError> {
        let credential = credential.ok_or(RealtimeError::MissingCredential)?;

        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return self.wait_for_outcome().await;
        }

        // A reconnect sleeping in backoff would race with this attempt.
        self.inner.stop_supervisor();
        *lock(&self.inner.credential) = Some(credential.clone());
        let generation = self.inner.generation.load(Ordering::SeqCst);

        match self.inner.open(&credential).await {
            Ok(stream) => {
                if self.inner.generation.load(Ordering::SeqCst) != generation {
                    debug!("Connect raced with disconnect, dropping new stream");
                    return Err(RealtimeError::Cancelled);
                }
                let outbound = self.inner.on_connected();
                Inner::spawn_supervisor(&self.inner, Some((stream, outbound)));
                Ok(())
            }
            Err(e) => {
                warn!("Failed to connect push channel: {}", e);
                self.inner.mark_disconnected(Some(e.to_string()));
                // Transient failures go through the same bounded retry as a
                // dropped channel; the caller still sees the first error.
                if e.is_retryable() && self.inner.generation.load(Ordering::SeqCst) == generation
                {
                    self.inner.attempts.store(0, Ordering::SeqCst);
                    self.inner.exhausted.store(false, Ordering::SeqCst);
                    self.inner.alerts.toast(
                        AlertLevel::Warning,
                        "Could not reach the notification service, retrying...",
                    );
                    Inner::spawn_supervisor(&self.inner, None);
                }
                Err(e)
            }
        }
    }

    async fn wait_for_outcome(&self) -> Result<(), RealtimeError> {
        let mut rx = self.inner.state.subscribe();
        let state = *rx
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map_err(|_| RealtimeError::NotConnected)?;

        match state {
            ConnectionState::Connected => Ok(()),
            _ => Err(RealtimeError::ConnectFailed(
                lock(&self.inner.last_error)
                    .clone()
                    .unwrap_or_else(|| "connection attempt failed".to_string()),
            )),
        }
    }

    /// Close the channel and cancel any scheduled reconnect. Idempotent.
    pub async fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let supervisor = lock(&self.inner.supervisor).take();
        if let Some(supervisor) = supervisor {
            supervisor.cancel.cancel();
            if let Err(e) = supervisor.handle.await {
                if !e.is_cancelled() {
                    error!("Push channel task failed: {}", e);
                }
            }
        }
        lock(&self.inner.outbound).take();

        let previous = self.inner.state.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            info!("Push channel disconnected");
        }
    }

    /// Send an event to the server. Fails unless connected.
    pub async fn emit(&self, event: ClientEvent) -> Result<(), RealtimeError> {
        if self.state() != ConnectionState::Connected {
            return Err(RealtimeError::NotConnected);
        }
        let sender = lock(&self.inner.outbound)
            .clone()
            .ok_or(RealtimeError::NotConnected)?;
        sender
            .send(event)
            .await
            .map_err(|_| RealtimeError::NotConnected)
    }

    /// Scope the channel to a user. Remembered and replayed after reconnects.
    pub async fn join_user_channel(&self, user_id: u64) {
        {
            let mut channels = lock(&self.inner.channels);
            if channels.contains(&user_id) {
                return;
            }
            channels.push(user_id);
        }
        if let Err(e) = self.emit(ClientEvent::subscribe(user_id)).await {
            debug!("Deferring subscribe for user {}: {}", user_id, e);
        }
    }

    pub async fn leave_user_channel(&self, user_id: u64) {
        let removed = {
            let mut channels = lock(&self.inner.channels);
            let before = channels.len();
            channels.retain(|id| *id != user_id);
            channels.len() != before
        };
        if removed {
            if let Err(e) = self.emit(ClientEvent::unsubscribe(user_id)).await {
                debug!("Skipping unsubscribe for user {}: {}", user_id, e);
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Consecutive reconnect attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// True once automatic reconnection has given up.
    pub fn is_exhausted(&self) -> bool {
        self.inner.exhausted.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.inner.registry
    }
}

impl Inner {
    async fn open(&self, credential: &Credential) -> Result<WsStream, RealtimeError> {
        let mut request = self
            .settings
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidUrl(e.to_string()))?;
        let header = HeaderValue::from_str(&credential.header_value())
            .map_err(|_| RealtimeError::InvalidCredential)?;
        request.headers_mut().insert(AUTHORIZATION, header);

        info!("Connecting to push channel at {}", self.settings.url);

        let connected = tokio::time::timeout(self.settings.connect_timeout, connect_async(request))
            .await
            .map_err(|_| RealtimeError::Timeout(self.settings.connect_timeout))?;

        match connected {
            Ok((stream, _)) => Ok(stream),
            Err(tungstenite::Error::Http(response))
                if response.status() == StatusCode::UNAUTHORIZED
                    || response.status() == StatusCode::FORBIDDEN =>
            {
                Err(RealtimeError::Unauthorized)
            }
            Err(e) => Err(RealtimeError::Handshake(e.to_string())),
        }
    }

    /// Publish the connected state and return the outbound queue receiver.
    fn on_connected(&self) -> mpsc::Receiver<ClientEvent> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        for user_id in lock(&self.channels).iter() {
            if tx.try_send(ClientEvent::subscribe(*user_id)).is_err() {
                warn!("Outbound queue full, dropping subscribe for user {}", user_id);
            }
        }
        *lock(&self.outbound) = Some(tx);
        *lock(&self.last_error) = None;
        self.attempts.store(0, Ordering::SeqCst);
        self.exhausted.store(false, Ordering::SeqCst);
        self.alerts.clear_banner();
        self.state.send_replace(ConnectionState::Connected);
        info!("Push channel connected");
        rx
    }

    fn mark_disconnected(&self, reason: Option<String>) {
        lock(&self.outbound).take();
        if reason.is_some() {
            *lock(&self.last_error) = reason;
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn stop_supervisor(&self) {
        if let Some(supervisor) = lock(&self.supervisor).take() {
            supervisor.cancel.cancel();
            supervisor.handle.abort();
        }
    }

    /// Run the supervisor, starting from an open session or, with `None`,
    /// straight from the reconnect loop.
    fn spawn_supervisor(this: &Arc<Self>, session: Option<OpenSession>) {
        let cancel = CancellationToken::new();
        let inner = Arc::clone(this);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.supervise(session, token).await });
        *lock(&this.supervisor) = Some(Supervisor { cancel, handle });
    }

    async fn supervise(
        self: Arc<Self>,
        mut session: Option<OpenSession>,
        cancel: CancellationToken,
    ) {
        loop {
            if let Some((stream, outbound)) = session.take() {
                match self.run_session(stream, outbound, &cancel).await {
                    SessionEnd::Closed => return,
                    SessionEnd::Lost(reason) => {
                        if cancel.is_cancelled() {
                            return;
                        }
                        warn!("Push channel lost: {}", reason);
                        self.mark_disconnected(Some(reason));
                        self.alerts.toast(
                            AlertLevel::Warning,
                            "Connection to the notification service lost, reconnecting...",
                        );
                    }
                }
            }
            match self.reconnect(&cancel).await {
                Some(next) => session = Some(next),
                None => return,
            }
        }
    }

    async fn reconnect(&self, cancel: &CancellationToken) -> Option<OpenSession> {
        let policy = &self.settings.policy;
        loop {
            let attempt = self.attempts.load(Ordering::SeqCst) + 1;
            let Some(delay) = policy.delay_for(attempt) else {
                self.give_up(UNAVAILABLE_BANNER);
                return None;
            };
            self.attempts.store(attempt, Ordering::SeqCst);
            info!(
                "Reconnecting push channel in {:?} (attempt {}/{})",
                delay, attempt, policy.max_attempts
            );

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let claimed = self.state.send_if_modified(|state| {
                if *state == ConnectionState::Disconnected {
                    *state = ConnectionState::Connecting;
                    true
                } else {
                    false
                }
            });
            if !claimed {
                // An explicit connect took over.
                return None;
            }

            let Some(credential) = lock(&self.credential).clone() else {
                self.mark_disconnected(Some("credential no longer available".to_string()));
                self.give_up(REJECTED_BANNER);
                return None;
            };

            let opened = tokio::select! {
                _ = cancel.cancelled() => return None,
                opened = self.open(&credential) => opened,
            };

            match opened {
                Ok(stream) => return Some((stream, self.on_connected())),
                Err(e) if e.is_retryable() => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    self.mark_disconnected(Some(e.to_string()));
                }
                Err(e) => {
                    warn!("Reconnect aborted: {}", e);
                    self.mark_disconnected(Some(e.to_string()));
                    self.give_up(REJECTED_BANNER);
                    return None;
                }
            }
        }
    }

    fn give_up(&self, banner: &str) {
        warn!(
            "Giving up on push channel after {} attempts",
            self.attempts.load(Ordering::SeqCst)
        );
        self.exhausted.store(true, Ordering::SeqCst);
        self.alerts.show_banner(banner);
        // Re-publish so watchers can observe the exhausted flag.
        self.state.send_replace(ConnectionState::Disconnected);
    }

    async fn run_session(
        &self,
        stream: WsStream,
        mut outbound: mpsc::Receiver<ClientEvent>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let (mut write, mut read) = stream.split();

        let mut keepalive = tokio::time::interval(self.settings.ping_interval);
        // First tick completes immediately.
        keepalive.tick().await;
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("Failed to send close frame: {}", e);
                    }
                    return SessionEnd::Closed;
                }
                Some(event) = outbound.recv() => {
                    match event.encode() {
                        Ok(text) => {
                            if let Err(e) = write.send(Message::text(text)).await {
                                return SessionEnd::Lost(format!("send failed: {}", e));
                            }
                        }
                        Err(e) => error!("Failed to serialize client event: {}", e),
                    }
                }
                _ = keepalive.tick() => {
                    if awaiting_pong {
                        return SessionEnd::Lost("server stopped answering pings".to_string());
                    }
                    awaiting_pong = true;
                    if let Err(e) = write.send(Message::Ping(Default::default())).await {
                        return SessionEnd::Lost(format!("ping failed: {}", e));
                    }
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            return SessionEnd::Lost(format!("pong failed: {}", e));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "no reason".to_string());
                        return SessionEnd::Lost(format!("closed by server ({})", reason));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("stream ended".to_string()),
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let event = match ServerEvent::decode(text) {
            Ok(event) => event,
            Err(e) => {
                debug!("Ignoring unrecognized push message: {}", e);
                return;
            }
        };

        // Delivery to the store must not depend on anyone being subscribed.
        if let ServerEvent::Notification(notification) = &event {
            self.store.add_notification(notification.clone());
        }

        let report = self.registry.dispatch(&event);
        debug!(
            "Dispatched '{}' to {} handlers ({} failed)",
            event.kind().as_str(),
            report.delivered + report.failed,
            report.failed
        );
    }
}
