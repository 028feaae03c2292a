/**
 * Real-time Session Registry
 *
 * One `Session` exists per live socket connection. It owns the outbound
 * channel drained by the connection's send task, the per-socket state map and
 * the set of rooms the socket joined.
 *
 * Sessions are handed to event handlers explicitly through the event context;
 * there is no process-wide "current socket".
 *
 * # Delivery
 *
 * `SessionRegistry::deliver` pushes an envelope into the outbound channel of
 * every matching session. A full or closed channel skips that session only.
 */

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::middleware::HandshakeInfo;
use crate::shared::{Envelope, ServerFrame};

/// Outbound buffer per connection
pub const CONNECTION_BUFFER_SIZE: usize = 64;

/// Message queued for a connection's send task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// JSON frame written as a text message
    Frame(ServerFrame),
    /// Liveness probe
    Ping,
    /// Close the connection from the server side
    Close,
}

struct SessionInner {
    id: Uuid,
    outbound: mpsc::Sender<Outbound>,
    state: DashMap<String, Value>,
    rooms: DashSet<String>,
    handshake: HandshakeInfo,
    connected_at: DateTime<Utc>,
}

/// Handle to one live connection
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("rooms", &self.rooms())
            .field("connected_at", &self.inner.connected_at)
            .finish()
    }
}

impl Session {
    /// Create a session and the receiver its send task drains
    pub fn new(handshake: HandshakeInfo) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER_SIZE);
        let session = Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                outbound: tx,
                state: DashMap::new(),
                rooms: DashSet::new(),
                handshake,
                connected_at: Utc::now(),
            }),
        };
        (session, rx)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn handshake(&self) -> &HandshakeInfo {
        &self.inner.handshake
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    /// Queue an event for this connection only
    ///
    /// Returns `false` if the connection is gone or its buffer is full.
    pub fn emit(&self, event: impl Into<String>, data: Value) -> bool {
        self.send(Outbound::Frame(ServerFrame::event(event, data)))
    }

    pub(crate) fn send(&self, message: Outbound) -> bool {
        match self.inner.outbound.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    "[Realtime] Outbound buffer full for session {}, dropping frame",
                    self.inner.id
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn join(&self, room: impl Into<String>) {
        self.inner.rooms.insert(room.into());
    }

    pub fn leave(&self, room: &str) {
        self.inner.rooms.remove(room);
    }

    pub fn in_room(&self, room: &str) -> bool {
        self.inner.rooms.contains(room)
    }

    /// Joined rooms, sorted
    pub fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.inner.rooms.iter().map(|r| r.key().clone()).collect();
        rooms.sort();
        rooms
    }

    /// Store a value in the per-socket state
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.state.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.get(key).map(|v| v.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.state.remove(key).map(|(_, v)| v)
    }

    /// Ask the send task to close the connection
    pub fn disconnect(&self) {
        // A full buffer still ends the session once the channel is dropped.
        let _ = self.inner.outbound.try_send(Outbound::Close);
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.outbound.is_closed()
    }
}

/// Live sessions of this process
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Session) {
        tracing::debug!("[Realtime] Session {} registered", session.id());
        self.sessions.insert(session.id(), session);
    }

    pub fn remove(&self, id: Uuid) -> Option<Session> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if removed.is_some() {
            tracing::debug!("[Realtime] Session {} removed", id);
        }
        removed
    }

    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Clone every live session handle
    pub fn snapshot(&self) -> Vec<Session> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Deliver an envelope to every matching local session
    ///
    /// Returns the number of sessions the frame was queued for.
    pub fn deliver(&self, envelope: &Envelope) -> usize {
        let mut delivered = 0;
        for session in self.snapshot() {
            if !envelope.targets(session.id(), |room| session.in_room(room)) {
                continue;
            }
            let frame = ServerFrame::event(envelope.event.clone(), envelope.data.clone());
            if session.send(Outbound::Frame(frame)) {
                delivered += 1;
            }
        }
        delivered
    }
}
