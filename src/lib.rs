//! Cinder - Main Library
//!
//! Cinder is an opinionated web-application bootstrapper built around a
//! real-time layer: persistent socket connections whose broadcasts are fanned
//! out across server processes through a pluggable pub/sub backplane.
//!
//! # Module Structure
//!
//! - **`shared`** - Types that cross a boundary
//!   - Client/server wire frames, backplane envelopes
//!   - Layered settings
//!   - Error types
//!
//! - **`backend`** - Server-side code
//!   - Axum HTTP server and socket endpoint
//!   - Backplane adapters: memory, cache (Redis), document store (MongoDB)
//!   - Ordered bring-up with retry and startup timeout
//!   - Convention-based event routing
//!
//! # Feature Flags
//!
//! - **`cache`** (default) - Redis backplane
//! - **`document-store`** (default) - MongoDB backplane and application database
//!
//! Selecting an adapter whose feature is disabled is a configuration error.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cinder::backend::server::Cinder;
//! use cinder::shared::Settings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load()?;
//! Cinder::builder(settings)
//!     .build()
//!     .serve(|addr| println!("listening on {}", addr))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! - `shared::ConfigError` for settings loading
//! - `shared::SharedError` for frames and envelopes
//! - `backend::error::BackendError` for everything the server does

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
pub mod backend;
