//! Pub/Sub Backplane
//!
//! A backplane relays broadcasts between server processes so that every
//! process can deliver them to its own sessions.
//!
//! # Adapters
//!
//! | Kind | Backend | Cross-process |
//! |------|---------|---------------|
//! | `memory` | `tokio::sync::broadcast` | no |
//! | `cache` | Redis PUBLISH/SUBSCRIBE | yes |
//! | `documentStore` | MongoDB collection + change stream | yes |
//!
//! Each adapter hands out one publisher and one subscriber, opened as two
//! independent connections. `select_backplane` only validates and builds the
//! adapter; no network I/O happens until the lifecycle manager calls
//! `prepare` and the `open_*` methods.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::error::BackendError;
use crate::shared::{AdapterKind, Envelope, SocketsConfig};

/// In-process adapter
pub mod memory;

/// Redis adapter
#[cfg(feature = "cache")]
pub mod cache;

/// MongoDB adapter
#[cfg(feature = "document-store")]
pub mod document;

pub use memory::MemoryBackplane;

#[cfg(feature = "cache")]
pub use cache::CacheBackplane;

#[cfg(feature = "document-store")]
pub use document::{DocumentStoreBackplane, ExistingDocumentStore};

/// Outgoing half of a backplane
#[async_trait]
pub trait BackplanePublisher: Send + Sync {
    async fn publish(&self, envelope: &Envelope) -> Result<(), BackendError>;
}

/// Incoming half of a backplane
#[async_trait]
pub trait BackplaneSubscriber: Send {
    /// Next envelope, or `None` once the underlying stream has ended
    async fn next(&mut self) -> Result<Option<Envelope>, BackendError>;
}

/// A selected, not yet connected backplane
#[async_trait]
pub trait BackplaneAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    /// One-time setup that must succeed before the connections are opened
    async fn prepare(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn open_publisher(&self) -> Result<Arc<dyn BackplanePublisher>, BackendError>;

    async fn open_subscriber(&self) -> Result<Box<dyn BackplaneSubscriber>, BackendError>;
}

/// Connections the application already holds and adapters may reuse
#[derive(Clone, Default)]
pub struct ExistingConnections {
    /// Application-wide MongoDB client
    #[cfg(feature = "document-store")]
    pub document_store: Option<ExistingDocumentStore>,
}

/// Pick and build the adapter named by the configuration
///
/// # Errors
///
/// Returns a `ConfigurationError` when the configuration is invalid, when the
/// selected adapter lacks required parameters, or when the crate was built
/// without the adapter's feature.
pub fn select_backplane(
    config: &SocketsConfig,
    existing: &ExistingConnections,
) -> Result<Box<dyn BackplaneAdapter>, BackendError> {
    config.validate()?;

    let adapter: Box<dyn BackplaneAdapter> = match config.adapter {
        AdapterKind::Memory => Box::new(MemoryBackplane::new()),

        #[cfg(feature = "cache")]
        AdapterKind::Cache => Box::new(CacheBackplane::from_params(&config.adapters.cache)?),

        #[cfg(feature = "document-store")]
        AdapterKind::DocumentStore => Box::new(DocumentStoreBackplane::resolve(
            &config.adapters.document_store,
            existing.document_store.as_ref(),
        )?),

        #[allow(unreachable_patterns)]
        other => {
            let _ = existing;
            return Err(BackendError::configuration(format!(
                "the {} adapter is not available in this build",
                other
            )));
        }
    };

    tracing::info!("[Backplane] Selected {} adapter", adapter.kind());
    Ok(adapter)
}
