//! Server Module
//!
//! Server initialization, application state and shared connections.
//!
//! # Module Structure
//!
//! ```text
//! server/
//! ├── mod.rs    - Module exports
//! ├── init.rs   - Cinder builder, bring-up, bind, graceful shutdown
//! ├── state.rs  - AppState and FromRef implementations
//! └── config.rs - Application database client
//! ```

pub mod config;
pub mod init;
pub mod state;

pub use init::{App, Cinder, CinderBuilder};
pub use state::AppState;
