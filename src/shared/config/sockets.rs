//! Real-time layer settings
//!
//! Everything under the `[sockets]` table: which backplane adapter to use,
//! transport timing, adapter connection parameters, bring-up retry policy and
//! the convention-based event map.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;

/// Pub/sub backplane used to fan events out across server processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum AdapterKind {
    /// In-process table, no cross-process fan-out
    #[default]
    Memory,
    /// Redis PUBLISH/SUBSCRIBE
    Cache,
    /// MongoDB collection with a TTL index
    DocumentStore,
}

impl AdapterKind {
    /// Whether this adapter can serve long-polling clients
    pub fn supports_polling(&self) -> bool {
        !matches!(self, AdapterKind::Cache)
    }
}

impl FromStr for AdapterKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "local" => Ok(AdapterKind::Memory),
            "cache" | "redis" => Ok(AdapterKind::Cache),
            "documentstore" | "document_store" | "document-store" | "mongodb" | "mongo" => {
                Ok(AdapterKind::DocumentStore)
            }
            other => Err(ConfigError::invalid(
                "sockets.adapter",
                format!("unknown adapter '{}' (expected memory, cache or documentStore)", other),
            )),
        }
    }
}

impl TryFrom<String> for AdapterKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterKind::Memory => "memory",
            AdapterKind::Cache => "cache",
            AdapterKind::DocumentStore => "documentStore",
        };
        f.write_str(name)
    }
}

/// Client transports a deployment allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Websocket,
    Polling,
}

/// Largest accepted ping interval or timeout (one day)
pub const MAX_PING_MS: u64 = 86_400_000;

/// Liveness timing and allowed transports
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    pub ping_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub allowed_transports: Vec<Transport>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            ping_timeout_ms: 4000,
            ping_interval_ms: 2000,
            allowed_transports: vec![Transport::Websocket, Transport::Polling],
        }
    }
}

impl TransportOptions {
    pub fn allows(&self, transport: Transport) -> bool {
        self.allowed_transports.contains(&transport)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// How long a connection may stay silent before it is closed
    pub fn idle_limit(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.saturating_add(self.ping_timeout_ms))
    }
}

/// Redis endpoint for the cache adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub channel_prefix: String,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            password: None,
            channel_prefix: "cinder-realtime".to_string(),
        }
    }
}

/// MongoDB target for the document-store adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentStoreParams {
    pub uri: Option<String>,
    pub database: Option<String>,
    pub collection: String,
    pub expire_after_seconds: u64,
    pub background: bool,
}

impl Default for DocumentStoreParams {
    fn default() -> Self {
        Self {
            uri: None,
            database: None,
            collection: "realtime-adapter-events".to_string(),
            expire_after_seconds: 3600,
            background: true,
        }
    }
}

/// Connection parameters, one table per adapter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdapterParams {
    pub cache: CacheParams,
    pub document_store: DocumentStoreParams,
}

/// Retry and timeout policy for backplane bring-up
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleOptions {
    /// Additional attempts after the first failed connect
    pub connect_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Upper bound for the whole bring-up sequence
    pub startup_timeout_ms: u64,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            connect_retries: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
            startup_timeout_ms: 30_000,
        }
    }
}

impl LifecycleOptions {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

/// The `[sockets]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocketsConfig {
    pub enabled: bool,
    pub adapter: AdapterKind,
    /// HTTP path of the socket endpoint
    pub path: String,
    /// Allowed origin for the socket endpoint
    pub cors: Option<String>,
    pub transport: TransportOptions,
    pub adapters: AdapterParams,
    pub lifecycle: LifecycleOptions,
    /// Event name -> `[module.]controller.action`
    pub events: BTreeMap<String, String>,
}

impl Default for SocketsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            adapter: AdapterKind::Memory,
            path: "/socket".to_string(),
            cors: None,
            transport: TransportOptions::default(),
            adapters: AdapterParams::default(),
            lifecycle: LifecycleOptions::default(),
            events: BTreeMap::new(),
        }
    }
}

impl SocketsConfig {
    /// Check the invariants that do not need any network access
    ///
    /// # Errors
    ///
    /// - the cache adapter combined with the polling transport
    /// - a ping interval or timeout of zero or above `MAX_PING_MS`
    /// - no allowed transport at all
    /// - a socket path that does not start with `/`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.adapter.supports_polling() && self.transport.allows(Transport::Polling) {
            return Err(ConfigError::invalid(
                "sockets.transport.allowed_transports",
                format!(
                    "the {} adapter requires persistent connections; set allowed_transports to [\"websocket\"]",
                    self.adapter
                ),
            ));
        }

        if self.transport.allowed_transports.is_empty() {
            return Err(ConfigError::invalid(
                "sockets.transport.allowed_transports",
                "at least one transport must be allowed",
            ));
        }

        if self.transport.ping_interval_ms == 0 || self.transport.ping_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "sockets.transport",
                "ping interval and timeout must be greater than zero",
            ));
        }

        if self.transport.ping_interval_ms > MAX_PING_MS || self.transport.ping_timeout_ms > MAX_PING_MS {
            return Err(ConfigError::invalid(
                "sockets.transport",
                format!("ping interval and timeout must not exceed {}ms", MAX_PING_MS),
            ));
        }

        if !self.path.starts_with('/') {
            return Err(ConfigError::invalid("sockets.path", "path must start with '/'"));
        }

        Ok(())
    }
}
