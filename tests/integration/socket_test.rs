//! WebSocket transport end to end

use std::time::Duration;

use axum::http::StatusCode;
use cinder::backend::error::BackendError;
use cinder::backend::middleware::middleware_fn;
use cinder::backend::realtime::{handler, on_connect};
use cinder::backend::server::Cinder;
use serde_json::json;
use tokio::sync::mpsc;

use crate::common::{
    connect, expect_silence, next_event, request, send_event, test_settings, try_connect_with_header,
    TestServer, WAIT,
};

#[tokio::test]
async fn test_connect_frame_carries_session_and_timing() {
    let server = TestServer::spawn(Cinder::builder(test_settings()).build()).await;

    let (_ws, greeting) = connect(&server.url("/socket")).await;
    assert!(greeting["sid"].as_str().is_some());
    assert_eq!(greeting["pingInterval"], 2000);
    assert_eq!(greeting["pingTimeout"], 4000);

    server.stop().await;
}

#[tokio::test]
async fn test_event_dispatch_with_ack() {
    let cinder = Cinder::builder(test_settings())
        .on(
            "echo",
            handler(|ctx, ack| async move {
                ack.send(json!({ "echo": ctx.body }));
            }),
        )
        .build();
    let server = TestServer::spawn(cinder).await;
    let (mut ws, _) = connect(&server.url("/socket")).await;

    let reply = request(&mut ws, "echo", json!({"n": 1}), 1).await;
    assert_eq!(reply, json!({"echo": {"n": 1}}));

    // Missing payload reaches the handler as an empty object.
    send_event(&mut ws, "echo", serde_json::Value::Null, Some(2)).await;
    let frame = next_event(&mut ws).await;
    assert_eq!(frame, json!({"ack": 2, "data": {"echo": {}}}));

    server.stop().await;
}

#[tokio::test]
async fn test_no_ack_requested_sends_nothing() {
    let cinder = Cinder::builder(test_settings())
        .on(
            "echo",
            handler(|ctx, ack| async move {
                assert!(!ack.requested());
                ack.send(ctx.body);
            }),
        )
        .build();
    let server = TestServer::spawn(cinder).await;
    let (mut ws, _) = connect(&server.url("/socket")).await;

    send_event(&mut ws, "echo", json!({}), None).await;
    expect_silence(&mut ws, Duration::from_millis(200)).await;

    server.stop().await;
}

#[tokio::test]
async fn test_handshake_middleware_gates_connections() {
    let cinder = Cinder::builder(test_settings())
        .middleware(middleware_fn("require-token", |handshake| {
            match handshake.info.bearer_token() {
                Some("letmein") => {
                    handshake.insert("user", json!("ada"));
                    Ok(())
                }
                _ => Err(BackendError::handshake(StatusCode::UNAUTHORIZED, "missing token")),
            }
        }))
        .on(
            "whoami",
            handler(|ctx, ack| async move {
                ack.send(ctx.session.get("user").unwrap_or_default());
            }),
        )
        .build();
    let server = TestServer::spawn(cinder).await;
    let url = server.url("/socket");

    let status = try_connect_with_header(&url, "authorization", "Bearer nope")
        .await
        .err()
        .expect("handshake should be refused");
    assert_eq!(status, 401);

    let mut ws = try_connect_with_header(&url, "authorization", "Bearer letmein")
        .await
        .ok()
        .expect("handshake should succeed");
    let greeting = next_event(&mut ws).await;
    assert_eq!(greeting["event"], "connect");

    let user = request(&mut ws, "whoami", json!({}), 1).await;
    assert_eq!(user, json!("ada"));

    server.stop().await;
}

#[tokio::test]
async fn test_on_connect_runs_before_first_event() {
    let cinder = Cinder::builder(test_settings())
        .on_connect(on_connect(|session, _server| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.set("greeted", json!(true));
            session.join("lobby");
        }))
        .on(
            "check",
            handler(|ctx, ack| async move {
                ack.send(json!({
                    "greeted": ctx.session.get("greeted"),
                    "rooms": ctx.session.rooms(),
                }));
            }),
        )
        .build();
    let server = TestServer::spawn(cinder).await;
    let (mut ws, _) = connect(&server.url("/socket")).await;

    let reply = request(&mut ws, "check", json!({}), 1).await;
    assert_eq!(reply, json!({"greeted": true, "rooms": ["lobby"]}));

    server.stop().await;
}

#[tokio::test]
async fn test_frames_from_slow_on_connect_are_not_dropped() {
    // More frames than the per-connection queue holds.
    const TICKS: u64 = 100;

    let cinder = Cinder::builder(test_settings())
        .on_connect(on_connect(|session, _server| async move {
            for i in 0..TICKS {
                session.emit("tick", json!(i));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }))
        .build();
    let server = TestServer::spawn(cinder).await;
    let (mut ws, _) = connect(&server.url("/socket")).await;

    for i in 0..TICKS {
        let frame = next_event(&mut ws).await;
        assert_eq!(frame, json!({"event": "tick", "data": i}));
    }

    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_route_fires_on_close() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cinder = Cinder::builder(test_settings())
        .on(
            "disconnect",
            handler(move |ctx, _ack| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((ctx.session.id(), ctx.body));
                }
            }),
        )
        .build();
    let server = TestServer::spawn(cinder).await;
    let (ws, greeting) = connect(&server.url("/socket")).await;
    drop(ws);

    let (sid, body) = tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("disconnect route did not fire")
        .unwrap();
    assert_eq!(json!(sid), greeting["sid"]);
    assert!(body["reason"].is_string());

    server.stop().await;
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let mut settings = test_settings();
    settings.sockets.transport.ping_interval_ms = 50;
    settings.sockets.transport.ping_timeout_ms = 50;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cinder = Cinder::builder(settings)
        .on(
            "disconnect",
            handler(move |ctx, _ack| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(ctx.body["reason"].clone());
                }
            }),
        )
        .build();
    let server = TestServer::spawn(cinder).await;

    // Never read from the socket: pings go unanswered.
    let (_ws, _) = connect(&server.url("/socket")).await;

    let reason = tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("idle connection was not closed")
        .unwrap();
    assert_eq!(reason, json!("ping timeout"));

    server.stop().await;
}

#[tokio::test]
async fn test_health_reports_realtime() {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    let app = assert_ok!(Cinder::builder(test_settings()).build().create_app().await);
    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["realtime"]["adapter"], "memory");
    assert_eq!(health["realtime"]["stage"], "Ready");
    assert_eq!(health["realtime"]["sessions"], 0);
}

#[tokio::test]
async fn test_socket_route_absent_when_disabled() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let mut settings = test_settings();
    settings.sockets.enabled = false;
    let app = assert_ok!(Cinder::builder(settings).build().create_app().await);

    let response = app
        .router
        .oneshot(Request::get("/socket").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
