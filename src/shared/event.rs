/**
 * Backplane Envelopes
 *
 * This module defines the record relayed between server processes through
 * the pub/sub backplane. Every broadcast emitted on one node is wrapped in an
 * `Envelope` so other nodes can deliver it to their own sessions.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::shared::error::SharedError;

/// A broadcast relayed through the backplane
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Node that emitted the broadcast
    pub node: Uuid,
    /// Event name delivered to clients
    pub event: String,
    /// Event payload
    pub data: Value,
    /// Restrict delivery to sessions in this room
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Skip this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub except: Option<Uuid>,
    /// When the broadcast was emitted
    pub created_at: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope addressed to every session
    pub fn new(node: Uuid, event: impl Into<String>, data: Value) -> Self {
        Self {
            node,
            event: event.into(),
            data,
            room: None,
            except: None,
            created_at: Utc::now(),
        }
    }

    /// Restrict the envelope to a room
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Exclude one session
    pub fn excluding(mut self, session: Uuid) -> Self {
        self.except = Some(session);
        self
    }

    /// Whether a session with the given id and rooms should receive this envelope
    pub fn targets(&self, session: Uuid, in_room: impl Fn(&str) -> bool) -> bool {
        if self.except == Some(session) {
            return false;
        }
        match &self.room {
            Some(room) => in_room(room),
            None => true,
        }
    }

    /// Encode for a text-based backplane
    pub fn encode(&self) -> Result<String, SharedError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an envelope read from a text-based backplane
    pub fn decode(text: &str) -> Result<Self, SharedError> {
        Ok(serde_json::from_str(text)?)
    }
}
