//! Convention-based routing from the event map

use cinder::backend::realtime::{handler, Controller};
use cinder::backend::server::Cinder;
use cinder::shared::Settings;
use serde_json::json;

use crate::common::{connect, request, test_settings, TestServer};

fn settings_with_events() -> Settings {
    let mut settings = test_settings();
    let events = &mut settings.sockets.events;
    events.insert("chat.send".to_string(), "Chat.send".to_string());
    events.insert("users.kick".to_string(), "admin.Users.kick".to_string());
    events.insert("users.ban".to_string(), "admin.Users.audit.ban".to_string());
    events.insert("broken.action".to_string(), "Chat.missing".to_string());
    events.insert("broken.controller".to_string(), "Nope.send".to_string());
    events.insert("broken.short".to_string(), "Chat".to_string());
    settings
}

fn cinder(settings: Settings) -> Cinder {
    let tag = |name: &'static str| {
        handler(move |ctx, ack| async move {
            ack.send(json!({ "action": name, "body": ctx.body }));
        })
    };

    Cinder::builder(settings)
        .controller("Chat", Controller::new().action("send", tag("chat.send")))
        .module_controller(
            "admin",
            "Users",
            Controller::new()
                .action("kick", tag("users.kick"))
                .action("ban", tag("users.ban")),
        )
        .build()
}

#[tokio::test]
async fn test_unresolved_routes_do_not_stop_startup() {
    let app = assert_ok!(cinder(settings_with_events()).create_app().await);
    assert!(app.realtime().is_some());
}

#[tokio::test]
async fn test_resolved_routes_dispatch_and_unresolved_stay_unbound() {
    let server = TestServer::spawn(cinder(settings_with_events())).await;
    let (mut ws, _) = connect(&server.url("/socket")).await;

    let reply = request(&mut ws, "chat.send", json!({"text": "hi"}), 1).await;
    assert_eq!(reply, json!({"action": "chat.send", "body": {"text": "hi"}}));

    let reply = request(&mut ws, "users.kick", json!({}), 2).await;
    assert_eq!(reply["action"], "users.kick");

    // First segment is the module, second the controller, last the action.
    let reply = request(&mut ws, "users.ban", json!({}), 3).await;
    assert_eq!(reply["action"], "users.ban");

    for (id, event) in [(4, "broken.action"), (5, "broken.controller"), (6, "broken.short")] {
        let reply = request(&mut ws, event, json!({}), id).await;
        assert_contains!(reply["error"].as_str().unwrap(), event);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_programmatic_route_overrides_event_map() {
    let mut settings = test_settings();
    settings
        .sockets
        .events
        .insert("chat.send".to_string(), "Chat.send".to_string());

    let cinder = Cinder::builder(settings)
        .controller(
            "Chat",
            Controller::new().action("send", handler(|_, ack| async move {
                ack.send(json!("from controller"));
            })),
        )
        .on("chat.send", handler(|_, ack| async move {
            ack.send(json!("from handler"));
        }))
        .build();

    let server = TestServer::spawn(cinder).await;
    let (mut ws, _) = connect(&server.url("/socket")).await;

    let reply = request(&mut ws, "chat.send", json!({}), 1).await;
    assert_eq!(reply, json!("from handler"));

    server.stop().await;
}

#[tokio::test]
async fn test_route_builder_binds_address() {
    let cinder = Cinder::builder(test_settings())
        .controller(
            "Status",
            Controller::new().action("get", handler(|_, ack| async move {
                ack.send(json!({"up": true}));
            })),
        )
        .route("status", "Status.get")
        .build();

    let server = TestServer::spawn(cinder).await;
    let (mut ws, _) = connect(&server.url("/socket")).await;

    assert_eq!(request(&mut ws, "status", json!({}), 1).await, json!({"up": true}));

    server.stop().await;
}
