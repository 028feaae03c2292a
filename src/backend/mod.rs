//! Backend Module
//!
//! This module contains all server-side code: the Axum HTTP server and the
//! real-time layer that fans socket events out across server processes.
//!
//! # Architecture
//!
//! - **`server`** - Builder, bring-up ordering, application state, shutdown
//! - **`realtime`** - Backplane adapters, lifecycle, event router, sessions,
//!   WebSocket transport
//! - **`routes`** - Router assembly
//! - **`middleware`** - Socket handshake middleware
//! - **`error`** - Backend-specific error types
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs          - Module exports and documentation
//! ├── main.rs         - cinder-server binary
//! ├── server/         - Server initialization and state
//! ├── realtime/       - Real-time layer
//! ├── routes/         - Route configuration
//! ├── middleware/     - Handshake middleware
//! └── error/          - Error types
//! ```
//!
//! # Startup Ordering
//!
//! The listening port is bound only after the backplane is fully up:
//!
//! ```text
//! settings -> select adapter -> prepare -> publisher + subscriber
//!          -> relay attached -> handler installed -> ready -> bind
//! ```
//!
//! Any configuration or connection error on that path aborts startup.

/// Server initialization and state
pub mod server;

/// Real-time layer
pub mod realtime;

/// Route configuration
pub mod routes;

/// Handshake middleware
pub mod middleware;

/// Backend-specific error types
pub mod error;
