use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use retro_core::ids::RetroId;
use retro_core::model::{Attachment, Column, Participant, TypingActivity};

use crate::room::RoomEvent;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected WebSocket client and its room attachment.
pub struct Client {
    pub id: ClientId,
    pub retro_id: RetroId,
    pub tx: mpsc::Sender<String>,
    pub attachment: Option<Attachment>,
    pub connected: AtomicBool,
    pub last_pong: AtomicU64,
}

impl Client {
    fn new(id: ClientId, retro_id: RetroId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            retro_id,
            tx,
            attachment: None,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected WebSocket clients across rooms. Attachments are
/// only mutated by the owning room coordinator; everything here is scans and
/// queue pushes.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Client>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new connection for a room and return its ID + outbound queue.
    pub fn register(&self, retro_id: RetroId) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.clients
            .insert(id.clone(), Client::new(id.clone(), retro_id, tx));
        (id, rx)
    }

    /// Remove a client. Dropping its sender lets the writer task drain the
    /// queue and close the socket.
    pub fn unregister(&self, id: &ClientId) {
        if let Some((_, client)) = self.clients.remove(id) {
            client.connected.store(false, Ordering::Relaxed);
        }
    }

    /// Bind (or rebind) the identity/role record to a connection.
    pub fn attach(&self, id: &ClientId, attachment: Attachment) {
        if let Some(mut client) = self.clients.get_mut(id) {
            client.attachment = Some(attachment);
        }
    }

    /// The attachment bound to a connection, if it has joined.
    pub fn attachment(&self, id: &ClientId) -> Option<Attachment> {
        self.clients.get(id).and_then(|c| c.attachment.clone())
    }

    /// Set or clear the typing column for a connection. Returns false when
    /// nothing changed (no attachment, or same column as before).
    pub fn set_typing(&self, id: &ClientId, typing_in: Option<Column>) -> bool {
        if let Some(mut client) = self.clients.get_mut(id) {
            if let Some(attachment) = client.attachment.as_mut() {
                if attachment.typing_in == typing_in {
                    return false;
                }
                attachment.typing_in = typing_in;
                return true;
            }
        }
        false
    }

    /// Clear every typing flag in a room. Returns true if any was set.
    pub fn clear_typing(&self, retro_id: &RetroId) -> bool {
        let mut cleared = false;
        for mut entry in self.clients.iter_mut() {
            if entry.retro_id != *retro_id {
                continue;
            }
            if let Some(attachment) = entry.attachment.as_mut() {
                if attachment.typing_in.take().is_some() {
                    cleared = true;
                }
            }
        }
        cleared
    }

    /// Per-column typing counts over live attachments in a room.
    pub fn typing_activity(&self, retro_id: &RetroId) -> TypingActivity {
        let mut activity = TypingActivity::default();
        for entry in self.clients.iter() {
            if entry.retro_id != *retro_id {
                continue;
            }
            if let Some(column) = entry.attachment.as_ref().and_then(|a| a.typing_in) {
                activity.bump(column);
            }
        }
        activity
    }

    /// Participants of a room, rebuilt from live connections.
    pub fn participants(&self, retro_id: &RetroId) -> Vec<Participant> {
        let mut participants = Vec::new();
        for entry in self.clients.iter() {
            if entry.retro_id != *retro_id {
                continue;
            }
            if let Some(attachment) = entry.attachment.as_ref() {
                participants.push(Participant {
                    id: attachment.visitor_id.clone(),
                    name: attachment.visitor_name.clone(),
                    is_facilitator: attachment.is_facilitator,
                    is_connected: entry.is_connected(),
                });
            }
        }
        participants
    }

    /// Send a message to a specific client. Drops the message if the queue is full.
    pub fn send_to(&self, id: &ClientId, message: String) -> bool {
        if let Some(client) = self.clients.get(id) {
            match client.tx.try_send(message) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    tracing::warn!(
                        client_id = %id,
                        msg_len = msg.len(),
                        "send queue full, dropping message"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        } else {
            false
        }
    }

    /// Broadcast a message to every connection in a room, optionally skipping one.
    pub fn broadcast(&self, retro_id: &RetroId, message: &str, exclude: Option<&ClientId>) {
        for entry in self.clients.iter() {
            if entry.retro_id != *retro_id || !entry.is_connected() {
                continue;
            }
            if exclude == Some(&entry.id) {
                continue;
            }
            let _ = entry.tx.try_send(message.to_string());
        }
    }

    /// Drop every connection in a room. Queued messages (e.g. the deletion
    /// notice) drain before the sockets close.
    pub fn close_room(&self, retro_id: &RetroId) -> usize {
        let doomed: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| entry.retro_id == *retro_id)
            .map(|entry| entry.id.clone())
            .collect();
        let count = doomed.len();
        for id in doomed {
            self.unregister(&id);
        }
        count
    }

    /// Number of registered connections.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    pub fn record_pong(&self, id: &ClientId) {
        if let Some(client) = self.clients.get(id) {
            client.record_pong();
        }
    }

    fn mark_disconnected(&self, id: &ClientId) {
        if let Some(client) = self.clients.get(id) {
            client.connected.store(false, Ordering::Relaxed);
        }
    }

    /// Remove clients that haven't responded to pings within the timeout.
    pub fn cleanup_dead_clients(&self) -> usize {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| !entry.is_alive())
            .map(|entry| entry.id.clone())
            .collect();

        let mut removed = 0;
        for id in dead {
            self.unregister(&id);
            removed += 1;
            tracing::info!(client_id = %id, "cleaned up dead client");
        }
        removed
    }
}

/// Handle a WebSocket connection: split into reader/writer, manage lifecycle
/// with heartbeat, and feed inbound frames into the room coordinator's inbox.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    room_tx: mpsc::Sender<RoomEvent>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward messages from channel to WebSocket + periodic ping
    let writer_cid = client_id.clone();
    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_cid, "sent ping");
                }
            }
        }

        writer_registry.mark_disconnected(&writer_cid);
    });

    // Reader task: forward text frames to the room, track pongs
    let reader_cid = client_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader_room_tx = room_tx.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let event = RoomEvent::Inbound {
                        client: reader_cid.clone(),
                        text: text.to_string(),
                    };
                    if reader_room_tx.send(event).await.is_err() {
                        break;
                    }
                }
                WsMessage::Pong(_) => {
                    reader_registry.record_pong(&reader_cid);
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum replies automatically
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    // Let the room run its leave sequence; if the room is already gone,
    // drop the registration directly.
    let leave = RoomEvent::Disconnected {
        client: client_id.clone(),
    };
    if room_tx.send(leave).await.is_err() {
        registry.unregister(&client_id);
    }
}

/// Start a background task that periodically cleans up dead clients.
pub fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_clients();
            if removed > 0 {
                tracing::info!(removed = removed, "dead client cleanup");
            }
        }
    })
}
