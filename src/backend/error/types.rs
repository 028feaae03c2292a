/**
 * Backend Error Types
 *
 * This module defines the errors raised while bootstrapping and running the
 * server and its real-time layer.
 *
 * # Error Categories
 *
 * ## Fatal at startup
 *
 * - `ConfigurationError` - missing adapter host/port, missing document-store
 *   URI, polling requested with an adapter that forbids it
 * - `ConnectionError` - publisher/subscriber connect failure, index creation
 *   failure, startup timeout
 *
 * Both stop the bootstrap before the listening port is bound.
 *
 * ## Isolated
 *
 * - `RouteResolutionError` - an event address that names no registered
 *   action; logged, the event stays unbound
 * - `BackplaneError` - a publish or relay failure after startup
 * - `HandshakeError` - a socket middleware refused a connection
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::shared::{AdapterKind, ConfigError, SharedError};

/// Backend-specific error types
#[derive(Debug, Error)]
pub enum BackendError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Human-readable error message
        message: String,
    },

    /// A backplane connection could not be established
    #[error("Connection error ({adapter}): {message}")]
    ConnectionError {
        /// Adapter being brought up
        adapter: AdapterKind,
        /// Human-readable error message
        message: String,
    },

    /// An event address that resolves to no handler
    #[error("Controller not found in {address} to socket event {event}")]
    RouteResolutionError {
        /// Event name from the event map
        event: String,
        /// Dotted `[module.]controller.action` address
        address: String,
    },

    /// Publish or relay failure on a running backplane
    #[error("Backplane error: {message}")]
    BackplaneError {
        /// Human-readable error message
        message: String,
    },

    /// A socket middleware refused the handshake
    #[error("Handshake rejected: {message}")]
    HandshakeError {
        /// HTTP status returned to the client
        status: StatusCode,
        /// Human-readable error message
        message: String,
    },

    /// Listener or filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared error (from shared module)
    #[error(transparent)]
    SharedError(#[from] SharedError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BackendError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a new connection error for an adapter
    pub fn connection(adapter: AdapterKind, message: impl Into<String>) -> Self {
        Self::ConnectionError {
            adapter,
            message: message.into(),
        }
    }

    /// Create a new route resolution error
    pub fn route_resolution(event: impl Into<String>, address: impl Into<String>) -> Self {
        Self::RouteResolutionError {
            event: event.into(),
            address: address.into(),
        }
    }

    /// Create a new backplane error
    pub fn backplane(message: impl Into<String>) -> Self {
        Self::BackplaneError {
            message: message.into(),
        }
    }

    /// Create a new handshake rejection
    pub fn handshake(status: StatusCode, message: impl Into<String>) -> Self {
        Self::HandshakeError {
            status,
            message: message.into(),
        }
    }

    /// Whether a bring-up step that failed with this error may be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionError { .. } | Self::Io(_))
    }

    /// Get the HTTP status code for this error
    ///
    /// - `HandshakeError` - uses the status code from the error
    /// - `RouteResolutionError` - 404 Not Found
    /// - `ConnectionError`, `BackplaneError` - 503 Service Unavailable
    /// - everything else - 500 Internal Server Error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::HandshakeError { status, .. } => *status,
            Self::RouteResolutionError { .. } => StatusCode::NOT_FOUND,
            Self::ConnectionError { .. } | Self::BackplaneError { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::SharedError(SharedError::FrameError { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::ConfigurationError { message }
            | Self::ConnectionError { message, .. }
            | Self::BackplaneError { message }
            | Self::HandshakeError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ConfigError> for BackendError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}
