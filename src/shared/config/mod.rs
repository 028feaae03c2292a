//! Application configuration module
//!
//! Settings are resolved from layered TOML files and then from environment
//! variables, later layers winning:
//!
//! 1. `{dir}/default.toml`
//! 2. `{dir}/{APP_ENV}.toml`
//! 3. `{dir}/local.toml`
//! 4. environment overrides (`NODE_PORT`/`PORT`, `MONGO_URI`,
//!    `SOCKETS_MONGO_URI`, `SOCKETS_MONGO_DATABASE`, `SOCKETS_MONGO_COLLECTION`)
//!
//! `dir` comes from `CINDER_CONFIG_DIR` and defaults to `config`. Missing
//! files are skipped. Layers are stacked with the `config` crate: tables are
//! merged key by key; any other value, arrays included, is replaced by the
//! later layer.

use std::path::Path;

use ::config::{Config, File, FileFormat, Value};
use serde::Deserialize;
use thiserror::Error;

/// `[sockets]` settings
pub mod sockets;

pub use sockets::{
    AdapterKind, AdapterParams, CacheParams, DocumentStoreParams, LifecycleOptions,
    SocketsConfig, Transport, TransportOptions,
};

/// Directory used when `CINDER_CONFIG_DIR` is not set
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// Environment used when `APP_ENV` is not set
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Application-wide document database
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub uri: Option<String>,
    pub database: Option<String>,
}

/// Fully resolved application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub sockets: SocketsConfig,
    /// Name of the active environment layer
    #[serde(skip)]
    pub environment: String,
}

impl Settings {
    /// Load settings from `CINDER_CONFIG_DIR` for `APP_ENV`, then apply the
    /// process environment
    pub fn load() -> Result<Self, ConfigError> {
        let dir = std::env::var("CINDER_CONFIG_DIR").unwrap_or_else(|_| DEFAULT_CONFIG_DIR.to_string());
        let environment = std::env::var("APP_ENV")
            .unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string())
            .to_lowercase();

        Self::from_sources(&dir, &environment, |key| std::env::var(key).ok())
    }

    /// Merge the TOML layers found in `dir` without looking at the environment
    pub fn from_layers(dir: impl AsRef<Path>, environment: &str) -> Result<Self, ConfigError> {
        Self::from_sources(dir, environment, |_| None)
    }

    /// Merge the TOML layers found in `dir`, then the overrides read through
    /// `lookup`
    pub fn from_sources<F>(dir: impl AsRef<Path>, environment: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dir = dir.as_ref();
        let mut builder = Config::builder();

        for layer in [DEFAULT_LAYER, environment, LOCAL_LAYER] {
            let path = dir.join(format!("{}.toml", layer));
            tracing::debug!("[Config] Layer {}", path.display());
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        for (key, value) in env_overrides(lookup)? {
            tracing::debug!("[Config] Override {}", key);
            builder = builder.set_override(key, value)?;
        }

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.environment = environment.to_string();
        Ok(settings)
    }

    /// Parse a single TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.environment = DEFAULT_ENVIRONMENT.to_string();
        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

const DEFAULT_LAYER: &str = "default";
const LOCAL_LAYER: &str = "local";

/// Deployment variables mapped onto settings keys
///
/// `NODE_PORT` wins over `PORT`. Blank values are ignored.
fn env_overrides<F>(lookup: F) -> Result<Vec<(&'static str, Value)>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let mut overrides: Vec<(&'static str, Value)> = Vec::new();

    if let Some(port) = non_empty("NODE_PORT").or_else(|| non_empty("PORT")) {
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::invalid("PORT", format!("'{}' is not a valid port", port)))?;
        overrides.push(("server.port", Value::from(i64::from(port))));
    }

    let strings = [
        ("MONGO_URI", "database.uri"),
        ("SOCKETS_MONGO_URI", "sockets.adapters.document_store.uri"),
        ("SOCKETS_MONGO_DATABASE", "sockets.adapters.document_store.database"),
        ("SOCKETS_MONGO_COLLECTION", "sockets.adapters.document_store.collection"),
    ];
    for (variable, key) in strings {
        if let Some(value) = non_empty(variable) {
            overrides.push((key, Value::from(value)));
        }
    }

    Ok(overrides)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
