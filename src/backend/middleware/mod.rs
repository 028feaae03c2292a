//! Middleware Module
//!
//! This module contains the middleware that runs before a socket connection
//! is accepted. Middlewares inspect the upgrade request, attach data to the
//! future session, or refuse the connection with an HTTP status.
//!
//! # Example
//!
//! ```rust,no_run
//! use cinder::backend::middleware::middleware_fn;
//!
//! let tag = middleware_fn("tag-origin", |handshake| {
//!     let origin = handshake.info.header("origin").unwrap_or("unknown").to_string();
//!     handshake.insert("origin", origin.into());
//!     Ok(())
//! });
//! ```

pub mod handshake;

pub use handshake::{middleware_fn, run_chain, FnMiddleware, Handshake, HandshakeInfo, SocketMiddleware};
