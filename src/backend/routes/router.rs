/**
 * Router Configuration
 *
 * This module assembles the Axum router.
 *
 * # Routes
 *
 * - `GET /health` - liveness and real-time summary; `status` is `degraded`
 *   while the relay is reopening its subscriber
 * - `GET {sockets.path}` - WebSocket endpoint, mounted only when the
 *   real-time layer is enabled, with its own CORS policy
 */

use axum::extract::State;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::backend::error::BackendError;
use crate::backend::realtime::socket::socket_handler;
use crate::backend::realtime::Stage;
use crate::backend::server::state::AppState;

/// Create the Axum router
///
/// # Errors
///
/// Returns a `ConfigurationError` when `sockets.cors` is not a valid origin.
pub fn create_router(app_state: AppState) -> Result<Router<()>, BackendError> {
    let mut router = Router::new().route("/health", get(health_handler));

    if let Some(realtime) = &app_state.realtime {
        let sockets = &app_state.settings.sockets;
        let socket_routes: Router<AppState> = Router::new()
            .route(&sockets.path, get(socket_handler))
            .layer(cors_layer(sockets.cors.as_deref())?)
            .with_state(realtime.clone());

        router = router.merge(socket_routes);
        tracing::info!("[Startup] Socket endpoint mounted at {}", sockets.path);
    }

    Ok(router
        .fallback(|| async { (axum::http::StatusCode::NOT_FOUND, "404 Not Found") })
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}

/// CORS policy for the socket endpoint; `None` or `*` allows any origin
pub fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, BackendError> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    match origin.map(str::trim) {
        None | Some("") | Some("*") => Ok(layer.allow_origin(Any)),
        Some(origin) => {
            let value = origin.parse::<HeaderValue>().map_err(|e| {
                BackendError::configuration(format!("sockets.cors '{}' is not a valid origin: {}", origin, e))
            })?;
            Ok(layer.allow_origin(value))
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let degraded = state
        .realtime
        .as_ref()
        .is_some_and(|server| server.stage() == Stage::Degraded);

    let realtime = state.realtime.as_ref().map(|server| {
        json!({
            "adapter": server.kind().to_string(),
            "stage": format!("{:?}", server.stage()),
            "sessions": server.sessions().len(),
            "node": server.node_id(),
        })
    });

    Json(json!({
        "status": if degraded { "degraded" } else { "ok" },
        "environment": state.settings.environment,
        "realtime": realtime,
    }))
}
