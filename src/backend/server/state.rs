/**
 * Application State Management
 *
 * `AppState` is the central state container handed to every HTTP handler.
 * The `FromRef` implementations let handlers extract only the part they
 * need, following Axum's recommended pattern.
 *
 * # Example
 *
 * ```rust,no_run
 * use axum::extract::State;
 * use cinder::backend::realtime::RealtimeServer;
 * use serde_json::json;
 *
 * async fn announce(State(realtime): State<Option<RealtimeServer>>) {
 *     if let Some(realtime) = realtime {
 *         let _ = realtime.emit("announcement", json!({"text": "deploying"})).await;
 *     }
 * }
 * ```
 */

use std::sync::Arc;

use axum::extract::FromRef;

use crate::backend::realtime::{ExistingConnections, RealtimeServer};
use crate::shared::Settings;

#[derive(Clone)]
pub struct AppState {
    /// Resolved settings, read-only once the server is built
    pub settings: Arc<Settings>,

    /// Real-time layer, `None` when `sockets.enabled` is false
    pub realtime: Option<RealtimeServer>,

    /// Connections shared with the real-time layer
    pub connections: ExistingConnections,
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}

impl FromRef<AppState> for Option<RealtimeServer> {
    fn from_ref(state: &AppState) -> Self {
        state.realtime.clone()
    }
}
