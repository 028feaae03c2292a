//! Common test utilities and helpers
//!
//! - Settings fixtures and scripted backplane adapters
//! - A test server bound on an ephemeral port
//! - A small WebSocket client speaking the JSON frame protocol
//! - Custom assertion macros

#[macro_use]
pub mod assertions;

pub use fixtures::*;
pub use ws_client::*;
