//! Push fan-out.
//!
//! Tracks every open push connection and which user channels each one has
//! joined. Events for a user are only delivered to connections that sent a
//! `subscribe` for that user's channel.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

use crate::realtime::ServerEvent;

const CONNECTION_BUFFER: usize = 32;

/// Instruction for a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outgoing {
    Event(ServerEvent),
    /// Close the connection without waiting for the client.
    Drop,
}

#[derive(Default)]
struct Connections {
    /// connection_id -> writer queue
    senders: HashMap<u64, mpsc::Sender<Outgoing>>,
    /// user_id -> connections that joined the user's channel
    channels: HashMap<u64, HashSet<u64>>,
}

#[derive(Default)]
pub struct ChannelHub {
    connections: RwLock<Connections>,
    next_id: AtomicU64,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// Returns its id and the receiver the caller should forward to the
    /// socket.
    pub async fn register(&self) -> (u64, mpsc::Receiver<Outgoing>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        self.connections.write().await.senders.insert(id, tx);
        (id, rx)
    }

    /// Unregister a connection (called on disconnect).
    ///
    /// Also removes it from every channel and cleans up empty channels.
    pub async fn unregister(&self, connection_id: u64) {
        let mut conns = self.connections.write().await;
        conns.senders.remove(&connection_id);
        conns.channels.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    /// Add a connection to the user's channel. Ignored for connections that
    /// are no longer registered.
    pub async fn join(&self, user_id: u64, connection_id: u64) {
        let mut conns = self.connections.write().await;
        if !conns.senders.contains_key(&connection_id) {
            return;
        }
        conns
            .channels
            .entry(user_id)
            .or_default()
            .insert(connection_id);
    }

    pub async fn leave(&self, user_id: u64, connection_id: u64) {
        let mut conns = self.connections.write().await;
        if let Some(members) = conns.channels.get_mut(&user_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                conns.channels.remove(&user_id);
            }
        }
    }

    /// Send an event to every connection in the user's channel.
    ///
    /// Returns how many connections accepted it.
    pub async fn broadcast_to_user(&self, user_id: u64, event: ServerEvent) -> usize {
        let conns = self.connections.read().await;
        let Some(members) = conns.channels.get(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        for connection_id in members {
            if let Some(sender) = conns.senders.get(connection_id) {
                if sender.send(Outgoing::Event(event.clone())).await.is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Force-close every open connection. Returns how many were told to.
    ///
    /// The connections leave the hub right away, so nothing is broadcast to
    /// them while their sockets are closing.
    pub async fn drop_all(&self) -> usize {
        let senders: Vec<_> = {
            let mut conns = self.connections.write().await;
            conns.channels.clear();
            conns.senders.drain().map(|(_, sender)| sender).collect()
        };
        let mut dropped = 0;
        for sender in &senders {
            if sender.send(Outgoing::Drop).await.is_ok() {
                dropped += 1;
            }
        }
        dropped
    }

    /// Number of connections subscribed to the user's channel.
    pub async fn channel_size(&self, user_id: u64) -> usize {
        self.connections
            .read()
            .await
            .channels
            .get(&user_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Total number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.senders.len()
    }
}
