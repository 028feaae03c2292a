/**
 * Cache (Redis) Backplane
 *
 * Envelopes are published as JSON text on `{channel_prefix}#events`.
 *
 * The publisher is a `ConnectionManager`, which reconnects on its own and is
 * cheap to clone per publish. The subscriber is a dedicated pub/sub
 * connection: Redis forbids regular commands on a subscribed connection, so
 * the two halves can never share one.
 */

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Msg};

use super::{BackplaneAdapter, BackplanePublisher, BackplaneSubscriber};
use crate::backend::error::BackendError;
use crate::shared::config::CacheParams;
use crate::shared::{AdapterKind, Envelope};

pub struct CacheBackplane {
    client: Client,
    channel: String,
}

impl CacheBackplane {
    /// Build the adapter without connecting
    ///
    /// # Errors
    ///
    /// `ConfigurationError` when `host` or `port` is missing or the resulting
    /// URL is rejected by the client.
    pub fn from_params(params: &CacheParams) -> Result<Self, BackendError> {
        let url = connection_url(params)?;
        let client = Client::open(url.as_str())
            .map_err(|e| BackendError::configuration(format!("invalid cache adapter URL: {}", e)))?;

        Ok(Self {
            client,
            channel: channel_name(&params.channel_prefix),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Pub/sub channel used for a prefix
pub fn channel_name(prefix: &str) -> String {
    format!("{}#events", prefix)
}

/// `redis://[:password@]host:port/`
pub fn connection_url(params: &CacheParams) -> Result<String, BackendError> {
    let host = params
        .host
        .as_deref()
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| {
            BackendError::configuration("sockets.adapters.cache.host is required for the cache adapter")
        })?;
    let port = params.port.ok_or_else(|| {
        BackendError::configuration("sockets.adapters.cache.port is required for the cache adapter")
    })?;

    Ok(match params.password.as_deref() {
        Some(password) if !password.is_empty() => format!(
            "redis://:{}@{}:{}/",
            urlencoding::encode(password),
            host,
            port
        ),
        _ => format!("redis://{}:{}/", host, port),
    })
}

#[async_trait]
impl BackplaneAdapter for CacheBackplane {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Cache
    }

    async fn open_publisher(&self) -> Result<Arc<dyn BackplanePublisher>, BackendError> {
        let conn = self
            .client
            .get_connection_manager()
            .await
            .map_err(|e| BackendError::connection(AdapterKind::Cache, format!("publisher: {}", e)))?;

        tracing::info!("[Backplane] Cache publisher connected");
        Ok(Arc::new(CachePublisher {
            conn,
            channel: self.channel.clone(),
        }))
    }

    async fn open_subscriber(&self) -> Result<Box<dyn BackplaneSubscriber>, BackendError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BackendError::connection(AdapterKind::Cache, format!("subscriber: {}", e)))?;

        pubsub.subscribe(&self.channel).await.map_err(|e| {
            BackendError::connection(AdapterKind::Cache, format!("subscribe {}: {}", self.channel, e))
        })?;

        tracing::info!("[Backplane] Cache subscriber listening on {}", self.channel);
        Ok(Box::new(CacheSubscriber {
            messages: Box::pin(pubsub.into_on_message()),
        }))
    }
}

struct CachePublisher {
    conn: ConnectionManager,
    channel: String,
}

#[async_trait]
impl BackplanePublisher for CachePublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), BackendError> {
        let payload = envelope.encode()?;
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn
            .publish(&self.channel, payload)
            .await
            .map_err(|e| BackendError::backplane(format!("cache publish failed: {}", e)))?;
        Ok(())
    }
}

struct CacheSubscriber {
    messages: Pin<Box<dyn Stream<Item = Msg> + Send>>,
}

#[async_trait]
impl BackplaneSubscriber for CacheSubscriber {
    async fn next(&mut self) -> Result<Option<Envelope>, BackendError> {
        while let Some(msg) = self.messages.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!("[Backplane] Non-text cache message ignored: {}", e);
                    continue;
                }
            };

            match Envelope::decode(&payload) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(e) => tracing::warn!("[Backplane] Malformed envelope ignored: {}", e),
            }
        }
        Ok(None)
    }
}
