//! Backplane Bring-up
//!
//! Ordering of the real-time layer start:
//!
//! 1. `prepare` the adapter (document store: ping + TTL index)
//! 2. open publisher and subscriber concurrently and wait for both
//! 3. attach the backplane (spawn the relay)
//! 4. install the connection handler; sockets are accepted from here on
//! 5. invoke the ready callback
//!
//! Each connect step is retried with bounded backoff. The whole sequence runs
//! under the startup timeout. Any failure aborts the bring-up and no partially
//! connected server is returned.

use std::sync::Arc;

use crate::backend::error::BackendError;
use crate::backend::realtime::backplane::BackplaneAdapter;
use crate::backend::realtime::broadcast::RealtimeServer;
use crate::backend::realtime::retry::{retry_connect, RetryPolicy};
use crate::shared::config::{LifecycleOptions, TransportOptions};

/// Position of the real-time layer in its start sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Connecting,
    AdapterAttached,
    Accepting,
    Ready,
    /// The relay lost its subscriber and is reopening it; foreign
    /// broadcasts are not delivered until it is back
    Degraded,
}

/// Bring the backplane up and return the running server
///
/// `setup` registers the connection handler and must leave the server
/// accepting; `ready` runs last.
///
/// # Errors
///
/// - `ConfigurationError` from `prepare` or `setup`, never retried
/// - `ConnectionError` once retries are spent or the startup timeout expires
pub async fn bring_up<S, R>(
    adapter: Arc<dyn BackplaneAdapter>,
    options: &LifecycleOptions,
    transport: TransportOptions,
    setup: S,
    ready: R,
) -> Result<RealtimeServer, BackendError>
where
    S: FnOnce(&RealtimeServer) -> Result<(), BackendError>,
    R: FnOnce(&RealtimeServer),
{
    let kind = adapter.kind();
    let policy = RetryPolicy::from(options);
    let timeout = options.startup_timeout();

    tracing::info!("[Lifecycle] Bringing up {} backplane", kind);

    let connect = async {
        retry_connect("prepare", &policy, || adapter.prepare()).await?;

        let (publisher, subscriber) = tokio::try_join!(
            retry_connect("publisher", &policy, || adapter.open_publisher()),
            retry_connect("subscriber", &policy, || adapter.open_subscriber()),
        )?;

        let server = RealtimeServer::new(adapter.clone(), publisher, transport, policy.clone());
        server.attach(subscriber);
        Ok::<_, BackendError>(server)
    };

    let server = match tokio::time::timeout(timeout, connect).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::error!("[Lifecycle] {} backplane not ready after {:?}", kind, timeout);
            return Err(BackendError::connection(
                kind,
                format!("startup timed out after {}ms", options.startup_timeout_ms),
            ));
        }
    };

    if let Err(e) = setup(&server) {
        server.shutdown();
        return Err(e);
    }
    if !server.is_accepting() {
        server.shutdown();
        return Err(BackendError::configuration(
            "no connection handler was installed during setup",
        ));
    }

    ready(&server);
    server.set_stage(Stage::Ready);
    tracing::info!("[Lifecycle] {} backplane ready (node {})", kind, server.node_id());
    Ok(server)
}
