//! Real-time Module
//!
//! Persistent socket connections fanned out across server processes through
//! a pub/sub backplane.
//!
//! # Module Structure
//!
//! ```text
//! realtime/
//! ├── mod.rs        - Module exports
//! ├── backplane/    - Adapter selection: memory, cache (Redis), document store (MongoDB)
//! ├── lifecycle.rs  - Ordered bring-up with retry and startup timeout
//! ├── retry.rs      - Backoff strategies
//! ├── broadcast.rs  - RealtimeServer handle and the backplane relay
//! ├── router.rs     - Convention-based event routing
//! ├── session.rs    - Per-connection sessions and the registry
//! └── socket.rs     - WebSocket upgrade and connection loop
//! ```

/// Pub/sub backplane adapters
pub mod backplane;

/// Broadcast handle
pub mod broadcast;

/// Bring-up sequence
pub mod lifecycle;

/// Connect retry
pub mod retry;

/// Event routing
pub mod router;

/// Sessions
pub mod session;

/// WebSocket transport
pub mod socket;

pub use backplane::{select_backplane, BackplaneAdapter, ExistingConnections};
pub use broadcast::RealtimeServer;
pub use lifecycle::{bring_up, Stage};
pub use router::{handler, Ack, Controller, ControllerRegistry, EventContext, EventRouter, EventTarget};
pub use session::{Session, SessionRegistry};
pub use socket::{on_connect, ConnectionHandler};
