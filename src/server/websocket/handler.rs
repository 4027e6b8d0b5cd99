//! Push-channel route handler.
//!
//! Handles the upgrade, the message loop and cleanup.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::hub::Outgoing;
use crate::realtime::ClientEvent;
use crate::server::session::{session_from_headers, ApiFailure};
use crate::server::state::ServerState;

/// Route handler for `GET /ws`.
///
/// Every attempt is counted, including the ones turned away.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<ServerState>,
) -> Response {
    let attempt = state.controls.record_handshake();

    if !state.controls.is_accepting() {
        debug!("Rejecting push handshake #{}: not accepting", attempt);
        return ApiFailure::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Push channel temporarily unavailable",
        )
        .into_response();
    }

    let Some(session) = session_from_headers(&headers, &state) else {
        warn!("Push handshake #{} without a valid token", attempt);
        return ApiFailure::unauthorized().into_response();
    };

    debug!("Push upgrade for user {}", session.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, session.user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: u64, state: ServerState) {
    let (connection_id, outgoing_rx) = state.hub.register().await;
    debug!("Push connected: user {} connection {}", user_id, connection_id);

    let (ws_sink, ws_stream) = socket.split();
    let mut outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx));

    tokio::select! {
        _ = process_incoming(ws_stream, user_id, connection_id, &state) => {}
        _ = &mut outgoing_handle => {
            debug!("Writer for connection {} stopped", connection_id);
        }
    }

    debug!("Push disconnected: user {} connection {}", user_id, connection_id);
    outgoing_handle.abort();
    state.hub.unregister(connection_id).await;
}

/// Forward queued events to the socket until told to drop it.
async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<Outgoing>,
) {
    while let Some(outgoing) = outgoing_rx.recv().await {
        match outgoing {
            Outgoing::Event(event) => match event.encode() {
                Ok(json) => {
                    if ws_sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize push event: {}", e);
                }
            },
            Outgoing::Drop => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

async fn process_incoming(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    user_id: u64,
    connection_id: u64,
    state: &ServerState,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match ClientEvent::decode(&text) {
                Ok(event) => handle_client_event(user_id, connection_id, event, state).await,
                Err(e) => debug!("Failed to parse client event: {}", e),
            },
            Ok(Message::Close(_)) => {
                debug!("Received close frame");
                break;
            }
            // Pings are answered by the socket itself
            Ok(_) => {}
            Err(e) => {
                debug!("Push socket error: {}", e);
                break;
            }
        }
    }
}

async fn handle_client_event(
    user_id: u64,
    connection_id: u64,
    event: ClientEvent,
    state: &ServerState,
) {
    match event {
        ClientEvent::Subscribe(channel) => {
            if channel.user_id != user_id {
                warn!(
                    "User {} tried to join the channel of user {}",
                    user_id, channel.user_id
                );
                return;
            }
            state.hub.join(user_id, connection_id).await;
        }
        ClientEvent::Unsubscribe(channel) => {
            state.hub.leave(channel.user_id, connection_id).await;
        }
        ClientEvent::NotificationRead(target) => {
            if state.book.mark_read(user_id, &target.id).is_none() {
                debug!("Read receipt for unknown notification {}", target.id);
            }
        }
        ClientEvent::NotificationReadAll => {
            state.book.mark_all_read(user_id);
        }
    }
}
