//! Cross-node fan-out over a shared in-memory backplane

use std::sync::Arc;
use std::time::Duration;

use cinder::backend::realtime::backplane::MemoryBackplane;
use cinder::backend::realtime::handler;
use cinder::backend::server::Cinder;
use serde_json::json;

use crate::common::{
    connect, expect_silence, next_event, request, send_event, test_settings, TestServer,
};

fn node(backplane: &MemoryBackplane) -> Cinder {
    Cinder::builder(test_settings())
        .backplane(Arc::new(backplane.clone()))
        .on(
            "join",
            handler(|ctx, ack| async move {
                if let Some(room) = ctx.body["room"].as_str() {
                    ctx.session.join(room);
                }
                ack.send(json!({"joined": ctx.session.rooms()}));
            }),
        )
        .on(
            "shout",
            handler(|ctx, ack| async move {
                let result = match ctx.body["room"].as_str() {
                    Some(room) => ctx.server.to(room).emit("shout", ctx.body.clone()).await,
                    None => ctx.server.emit("shout", ctx.body.clone()).await,
                };
                ack.send(json!({"local": result.unwrap_or(0)}));
            }),
        )
        .on(
            "shout.others",
            handler(|ctx, ack| async move {
                let result = ctx
                    .server
                    .except(ctx.session.id())
                    .emit("shout", ctx.body.clone())
                    .await;
                ack.send(json!({"local": result.unwrap_or(0)}));
            }),
        )
        .build()
}

#[tokio::test]
async fn test_broadcast_reaches_other_node_once() {
    let backplane = MemoryBackplane::new();
    let first = TestServer::spawn(node(&backplane)).await;
    let second = TestServer::spawn(node(&backplane)).await;

    let (mut alice, _) = connect(&first.url("/socket")).await;
    let (mut bob, _) = connect(&second.url("/socket")).await;

    send_event(&mut alice, "shout", json!({"text": "hi"}), Some(1)).await;

    // Sender's own node delivers locally before the ack; its backplane echo is dropped.
    let frame = next_event(&mut alice).await;
    assert_eq!(frame, json!({"event": "shout", "data": {"text": "hi"}}));
    let ack = next_event(&mut alice).await;
    assert_eq!(ack, json!({"ack": 1, "data": {"local": 1}}));
    expect_silence(&mut alice, Duration::from_millis(200)).await;

    let frame = next_event(&mut bob).await;
    assert_eq!(frame, json!({"event": "shout", "data": {"text": "hi"}}));
    expect_silence(&mut bob, Duration::from_millis(200)).await;

    first.stop().await;
    second.stop().await;
}

#[tokio::test]
async fn test_room_broadcast_across_nodes() {
    let backplane = MemoryBackplane::new();
    let first = TestServer::spawn(node(&backplane)).await;
    let second = TestServer::spawn(node(&backplane)).await;

    let (mut alice, _) = connect(&first.url("/socket")).await;
    let (mut bob, _) = connect(&second.url("/socket")).await;
    let (mut carol, _) = connect(&second.url("/socket")).await;

    request(&mut bob, "join", json!({"room": "lobby"}), 1).await;

    send_event(&mut alice, "shout", json!({"room": "lobby", "text": "psst"}), Some(2)).await;
    let ack = next_event(&mut alice).await;
    assert_eq!(ack, json!({"ack": 2, "data": {"local": 0}}));

    let frame = next_event(&mut bob).await;
    assert_eq!(frame["data"]["text"], "psst");
    expect_silence(&mut carol, Duration::from_millis(200)).await;
    expect_silence(&mut alice, Duration::from_millis(100)).await;

    first.stop().await;
    second.stop().await;
}

#[tokio::test]
async fn test_except_skips_sender_everywhere() {
    let backplane = MemoryBackplane::new();
    let first = TestServer::spawn(node(&backplane)).await;
    let second = TestServer::spawn(node(&backplane)).await;

    let (mut alice, _) = connect(&first.url("/socket")).await;
    let (mut bob, _) = connect(&second.url("/socket")).await;

    send_event(&mut alice, "shout.others", json!({"text": "bye"}), Some(1)).await;
    let ack = next_event(&mut alice).await;
    assert_eq!(ack, json!({"ack": 1, "data": {"local": 0}}));

    let frame = next_event(&mut bob).await;
    assert_eq!(frame["data"]["text"], "bye");
    expect_silence(&mut alice, Duration::from_millis(200)).await;

    first.stop().await;
    second.stop().await;
}
