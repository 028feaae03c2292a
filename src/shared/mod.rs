//! Shared Module
//!
//! This module contains the types that cross a boundary: frames exchanged
//! with clients, envelopes exchanged between server processes through the
//! backplane, and the settings the whole application is started from.
//!
//! # Overview
//!
//! Nothing in here touches the network. The backend builds on these types to
//! run the HTTP server and the real-time layer.

/// Backplane envelopes
pub mod event;

/// Client/server wire frames
pub mod frame;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use self::config::{AdapterKind, ConfigError, Settings, SocketsConfig};
pub use error::SharedError;
pub use event::Envelope;
pub use frame::{ClientFrame, ServerFrame};
