/**
 * Real-time Wire Frames
 *
 * This module defines the JSON frames exchanged with clients over a
 * persistent real-time connection.
 *
 * # Client Frames
 *
 * ```json
 * { "event": "chat.send", "data": { "text": "hi" }, "ack": 7 }
 * ```
 *
 * `data` and `ack` are optional. When `ack` is present the server answers
 * with an acknowledgement frame carrying the same id.
 *
 * # Server Frames
 *
 * ```json
 * { "event": "chat.message", "data": { "text": "hi" } }
 * { "ack": 7, "data": { "ok": true } }
 * ```
 */
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::shared::error::SharedError;

/// Name of the frame sent to a client right after its connection is accepted
pub const CONNECT_EVENT: &str = "connect";

/// Reserved route name invoked when a connection is torn down
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Frame received from a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientFrame {
    /// Event name, looked up in the event router
    pub event: String,
    /// Optional payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Optional acknowledgement id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl ClientFrame {
    /// Create a frame without payload or acknowledgement
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: None,
            ack: None,
        }
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Request an acknowledgement
    pub fn with_ack(mut self, ack: u64) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Parse a text frame received from a client
    ///
    /// # Errors
    ///
    /// Returns a `FrameError` if the text is not a JSON object with a
    /// non-empty `event` field.
    pub fn parse(text: &str) -> Result<Self, SharedError> {
        let frame: ClientFrame = serde_json::from_str(text)
            .map_err(|e| SharedError::frame(format!("invalid frame: {}", e)))?;

        if frame.event.trim().is_empty() {
            return Err(SharedError::frame("event name cannot be empty"));
        }

        Ok(frame)
    }

    /// The payload handed to handlers; a missing or `null` payload becomes `{}`
    pub fn body(&self) -> Value {
        match &self.data {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(value) => value.clone(),
        }
    }
}

/// Frame sent to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Acknowledgement of a client frame
    Ack {
        /// Id copied from the client frame
        ack: u64,
        /// Handler response
        data: Value,
    },
    /// Named event
    Event {
        /// Event name
        event: String,
        /// Event payload
        data: Value,
    },
}

impl ServerFrame {
    /// Create an event frame
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self::Event {
            event: event.into(),
            data,
        }
    }

    /// Create an acknowledgement frame
    pub fn ack(ack: u64, data: Value) -> Self {
        Self::Ack { ack, data }
    }

    /// Create the greeting frame sent after a connection is accepted
    pub fn connect(sid: Uuid, ping_interval_ms: u64, ping_timeout_ms: u64) -> Self {
        Self::event(
            CONNECT_EVENT,
            serde_json::json!({
                "sid": sid,
                "pingInterval": ping_interval_ms,
                "pingTimeout": ping_timeout_ms,
            }),
        )
    }

    /// Serialize the frame for a text message
    pub fn to_text(&self) -> Result<String, SharedError> {
        Ok(serde_json::to_string(self)?)
    }
}
