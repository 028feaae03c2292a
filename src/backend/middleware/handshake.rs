/**
 * Socket Handshake Middleware
 *
 * Middlewares run on the HTTP upgrade request of the socket endpoint, in
 * registration order, before any session exists. A middleware can:
 *
 * 1. Inspect headers, query parameters and the remote address
 * 2. Attach data that is copied into the session state
 * 3. Refuse the connection with an HTTP status
 *
 * The first refusal stops the chain; the client receives the error response
 * and no session is created.
 */

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};

use crate::backend::error::BackendError;

/// Request data captured from the upgrade request
#[derive(Debug, Clone, Default)]
pub struct HandshakeInfo {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub remote_addr: Option<SocketAddr>,
}

impl HandshakeInfo {
    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Bearer token from the `Authorization` header or the `token` query parameter
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .or_else(|| self.query.get("token").map(String::as_str))
    }
}

/// A connection attempt passing through the middleware chain
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub info: HandshakeInfo,
    /// Values copied into the session state once the connection is accepted
    pub data: Map<String, Value>,
}

impl Handshake {
    pub fn new(info: HandshakeInfo) -> Self {
        Self {
            info,
            data: Map::new(),
        }
    }

    /// Attach a value to the future session
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }
}

/// Middleware executed before a socket connection is accepted
#[async_trait]
pub trait SocketMiddleware: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn handle(&self, handshake: &mut Handshake) -> Result<(), BackendError>;
}

type BoxedCheck = Box<
    dyn for<'a> Fn(&'a mut Handshake) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + 'a>>
        + Send
        + Sync,
>;

/// Closure-backed middleware
pub struct FnMiddleware {
    name: String,
    check: BoxedCheck,
}

#[async_trait]
impl SocketMiddleware for FnMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, handshake: &mut Handshake) -> Result<(), BackendError> {
        (self.check)(handshake).await
    }
}

/// Build a middleware from a synchronous check
///
/// ```rust
/// use axum::http::StatusCode;
/// use cinder::backend::error::BackendError;
/// use cinder::backend::middleware::middleware_fn;
///
/// let require_token = middleware_fn("require-token", |handshake| {
///     match handshake.info.bearer_token() {
///         Some(token) => {
///             handshake.insert("token", token.into());
///             Ok(())
///         }
///         None => Err(BackendError::handshake(StatusCode::UNAUTHORIZED, "missing token")),
///     }
/// });
/// ```
pub fn middleware_fn<F>(name: impl Into<String>, check: F) -> Arc<dyn SocketMiddleware>
where
    F: Fn(&mut Handshake) -> Result<(), BackendError> + Send + Sync + 'static,
{
    let check: BoxedCheck = Box::new(move |handshake| {
        let result = check(handshake);
        Box::pin(async move { result })
    });

    Arc::new(FnMiddleware {
        name: name.into(),
        check,
    })
}

/// Run every middleware in order, stopping at the first refusal
pub async fn run_chain(
    middlewares: &[Arc<dyn SocketMiddleware>],
    handshake: &mut Handshake,
) -> Result<(), BackendError> {
    for middleware in middlewares {
        if let Err(err) = middleware.handle(handshake).await {
            tracing::warn!(
                "[Realtime] Handshake rejected by middleware '{}': {}",
                middleware.name(),
                err
            );
            return Err(match err {
                BackendError::HandshakeError { .. } => err,
                other => BackendError::handshake(StatusCode::FORBIDDEN, other.message()),
            });
        }
    }
    Ok(())
}
