//! Shared Error Types
//!
//! This module defines error types shared by the wire layer (frames and
//! backplane envelopes) and the backend. These errors represent failures that
//! can occur while encoding or decoding anything that crosses a process or
//! connection boundary.
//!
//! # Error Categories
//!
//! - `SerializationError` - JSON serialization/deserialization failures
//! - `FrameError` - Malformed real-time frames received from a client
//!
//! # Usage
//!
//! ```rust
//! use cinder::shared::error::SharedError;
//!
//! let error = SharedError::frame("event name cannot be empty");
//! ```
use thiserror::Error;

/// Shared error types for frames and envelopes
#[derive(Debug, Error, Clone)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// A client frame that could not be understood
    #[error("Frame error: {message}")]
    FrameError {
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new frame error
    pub fn frame(message: impl Into<String>) -> Self {
        Self::FrameError {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
