/**
 * WebSocket Transport
 *
 * Serves the socket endpoint:
 *
 * 1. Refuse with 503 until the real-time server accepts connections
 * 2. Run the handshake middleware chain on the upgrade request
 * 3. Upgrade, start the outbound writer, register the session and send the
 *    `connect` frame
 * 4. Run the `on_connect` hook before reading any client frame
 * 5. Dispatch client frames one at a time through the event router
 * 6. On close, remove the session and run the `disconnect` route
 *
 * # Liveness
 *
 * The server pings every `ping_interval_ms`. A connection that produced no
 * frame or pong for `ping_interval_ms + ping_timeout_ms` is closed.
 */

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::{interval_at, Instant};

use crate::backend::error::BackendError;
use crate::backend::middleware::{run_chain, Handshake, HandshakeInfo, SocketMiddleware};
use crate::backend::realtime::broadcast::RealtimeServer;
use crate::backend::realtime::router::{Ack, EventContext, EventRouter};
use crate::backend::realtime::session::{Outbound, Session};
use crate::shared::config::Transport;
use crate::shared::frame::{CONNECT_EVENT, DISCONNECT_EVENT};
use crate::shared::{ClientFrame, ServerFrame};

/// Grace period for the close frame once a connection is torn down
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Hook run once per accepted connection, before any of its events
pub type OnConnect = Arc<dyn Fn(Session, RealtimeServer) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async function as an `OnConnect` hook
pub fn on_connect<F, Fut>(f: F) -> OnConnect
where
    F: Fn(Session, RealtimeServer) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |session, server| Box::pin(f(session, server)))
}

/// Everything needed to serve a socket connection
#[derive(Clone, Default)]
pub struct ConnectionHandler {
    pub router: EventRouter,
    pub on_connect: Option<OnConnect>,
    pub middlewares: Vec<Arc<dyn SocketMiddleware>>,
}

/// Upgrade handler mounted on the socket path
pub async fn socket_handler(
    State(server): State<RealtimeServer>,
    ws: WebSocketUpgrade,
    request: Request,
) -> Response {
    let handler = match server.connection_handler() {
        Some(handler) if server.is_accepting() => handler,
        _ => {
            return BackendError::backplane("real-time server is not accepting connections")
                .into_response()
        }
    };

    if !server.transport().allows(Transport::Websocket) {
        return BackendError::handshake(StatusCode::BAD_REQUEST, "websocket transport is disabled")
            .into_response();
    }

    let query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let mut handshake = Handshake::new(HandshakeInfo {
        headers: request.headers().clone(),
        query,
        remote_addr,
    });

    if let Err(e) = run_chain(&handler.middlewares, &mut handshake).await {
        return e.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, server, handler, handshake))
}

async fn handle_socket(
    socket: WebSocket,
    server: RealtimeServer,
    handler: Arc<ConnectionHandler>,
    handshake: Handshake,
) {
    let Handshake { info, data } = handshake;
    let (session, mut outbound) = Session::new(info);
    for (key, value) in data {
        session.set(key, value);
    }

    let (mut sender, mut receiver) = socket.split();

    // Task to forward queued frames to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let message = match message {
                Outbound::Frame(frame) => match frame.to_text() {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::warn!("[Realtime] Dropping unserializable frame: {}", e);
                        continue;
                    }
                },
                Outbound::Ping => Message::Ping(Bytes::new()),
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Writer is running, so frames queued by the hook drain as they come.
    let transport = server.transport().clone();
    server.sessions().register(session.clone());
    session.send(Outbound::Frame(ServerFrame::connect(
        session.id(),
        transport.ping_interval_ms,
        transport.ping_timeout_ms,
    )));

    if let Some(on_connect) = &handler.on_connect {
        on_connect(session.clone(), server.clone()).await;
    }
    tracing::info!("[Realtime] Client connected: {}", session.id());

    let idle_limit = transport.idle_limit();
    let mut ping = interval_at(Instant::now() + transport.ping_interval(), transport.ping_interval());
    let mut last_seen = Instant::now();
    let mut send_done = false;

    let reason = loop {
        tokio::select! {
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_text(text.as_str(), &session, &server, &handler.router).await;
                    last_seen = Instant::now();
                }
                Some(Ok(Message::Close(_))) | None => break "client disconnect",
                Some(Ok(_)) => last_seen = Instant::now(),
                Some(Err(e)) => {
                    tracing::debug!("[Realtime] Transport error on {}: {}", session.id(), e);
                    break "transport error";
                }
            },
            _ = ping.tick() => {
                if last_seen.elapsed() > idle_limit {
                    break "ping timeout";
                }
                session.send(Outbound::Ping);
            }
            _ = &mut send_task => {
                send_done = true;
                break "server disconnect";
            }
        }
    };

    server.sessions().remove(session.id());

    if !send_done {
        session.disconnect();
        if tokio::time::timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
            send_task.abort();
        }
    }

    if handler.router.contains(DISCONNECT_EVENT) {
        let ctx = EventContext {
            event: DISCONNECT_EVENT.to_string(),
            session: session.clone(),
            body: json!({ "reason": reason }),
            server: server.clone(),
        };
        handler.router.dispatch(ctx, Ack::new(None, session.clone())).await;
    }

    tracing::info!("[Realtime] Client disconnected: {} ({})", session.id(), reason);
}

async fn handle_text(text: &str, session: &Session, server: &RealtimeServer, router: &EventRouter) {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("[Realtime] Invalid frame from {}: {}", session.id(), e);
            session.emit("error", json!({ "message": e.to_string() }));
            return;
        }
    };

    if frame.event == CONNECT_EVENT || frame.event == DISCONNECT_EVENT {
        tracing::warn!(
            "[Realtime] Session {} sent reserved event '{}', ignored",
            session.id(),
            frame.event
        );
        return;
    }

    let ctx = EventContext {
        event: frame.event.clone(),
        session: session.clone(),
        body: frame.body(),
        server: server.clone(),
    };

    if !router.dispatch(ctx, Ack::new(frame.ack, session.clone())).await {
        if let Some(id) = frame.ack {
            session.send(Outbound::Frame(ServerFrame::ack(
                id,
                json!({ "error": format!("unknown event '{}'", frame.event) }),
            )));
        }
    }
}
