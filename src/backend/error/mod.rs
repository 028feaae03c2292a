//! Backend Error Module
//!
//! This module defines error types specific to the backend server.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - Error type definitions
//! └── conversion.rs - IntoResponse implementation
//! ```
//!
//! # Propagation
//!
//! Configuration and connection errors never reach individual connections:
//! they abort the bootstrap before the port is bound. Route resolution
//! errors are isolated per event. Everything else is reported to the single
//! connection or request it belongs to.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

// Re-export commonly used types
pub use types::BackendError;
