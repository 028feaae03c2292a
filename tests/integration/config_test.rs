//! Layered settings and environment overrides

use std::fs;

use cinder::shared::config::Transport;
use cinder::shared::{AdapterKind, Settings};
use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::TempDir;

fn write_layers(layers: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in layers {
        fs::write(dir.path().join(format!("{}.toml", name)), body).unwrap();
    }
    dir
}

const ENV_KEYS: &[&str] = &[
    "CINDER_CONFIG_DIR",
    "APP_ENV",
    "NODE_PORT",
    "PORT",
    "MONGO_URI",
    "SOCKETS_MONGO_URI",
    "SOCKETS_MONGO_DATABASE",
    "SOCKETS_MONGO_COLLECTION",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
fn test_layers_merge_in_order() {
    let dir = write_layers(&[
        (
            "default",
            r#"
            [server]
            port = 8000

            [sockets]
            enabled = true
            adapter = "memory"

            [sockets.transport]
            allowed_transports = ["websocket", "polling"]

            [sockets.events]
            "chat.send" = "Chat.send"
            "#,
        ),
        (
            "production",
            r#"
            [sockets]
            adapter = "redis"

            [sockets.transport]
            allowed_transports = ["websocket"]

            [sockets.adapters.cache]
            host = "cache.internal"
            port = 6379

            [sockets.events]
            "chat.leave" = "Chat.leave"
            "#,
        ),
        (
            "local",
            r#"
            [server]
            port = 9000
            "#,
        ),
    ]);

    let settings = assert_ok!(Settings::from_layers(dir.path(), "production"));
    assert!(settings.is_production());
    assert_eq!(settings.server.port, 9000);
    assert_eq!(settings.sockets.adapter, AdapterKind::Cache);
    assert_eq!(settings.sockets.transport.allowed_transports, vec![Transport::Websocket]);
    assert_eq!(settings.sockets.adapters.cache.host.as_deref(), Some("cache.internal"));
    assert_eq!(settings.sockets.events.len(), 2);
    assert!(settings.sockets.validate().is_ok());
}

#[test]
fn test_missing_layers_are_skipped() {
    let dir = write_layers(&[]);
    let settings = assert_ok!(Settings::from_layers(dir.path(), "development"));
    assert!(!settings.sockets.enabled);
    assert_eq!(settings.server.port, 8000);
}

#[test]
fn test_malformed_layer_is_an_error() {
    let dir = write_layers(&[("default", "[server\nport = ")]);
    assert!(Settings::from_layers(dir.path(), "development").is_err());
}

#[test]
#[serial]
fn test_load_applies_environment() {
    clear_env();
    let dir = write_layers(&[(
        "default",
        r#"
        [sockets.adapters.document_store]
        collection = "from-file"
        "#,
    )]);

    std::env::set_var("CINDER_CONFIG_DIR", dir.path());
    std::env::set_var("APP_ENV", "staging");
    std::env::set_var("NODE_PORT", "7100");
    std::env::set_var("PORT", "7200");
    std::env::set_var("SOCKETS_MONGO_URI", "mongodb://relay:27017");
    std::env::set_var("SOCKETS_MONGO_DATABASE", "relay");
    std::env::set_var("SOCKETS_MONGO_COLLECTION", "from-env");

    let settings = Settings::load();
    clear_env();
    let settings = assert_ok!(settings);

    assert_eq!(settings.environment, "staging");
    assert_eq!(settings.server.port, 7100);
    let document_store = &settings.sockets.adapters.document_store;
    assert_eq!(document_store.uri.as_deref(), Some("mongodb://relay:27017"));
    assert_eq!(document_store.database.as_deref(), Some("relay"));
    assert_eq!(document_store.collection, "from-env");
}

#[test]
#[serial]
fn test_invalid_port_in_environment() {
    clear_env();
    let dir = write_layers(&[]);
    std::env::set_var("CINDER_CONFIG_DIR", dir.path());
    std::env::set_var("PORT", "eighty");

    let result = Settings::load();
    clear_env();
    assert!(result.is_err());
}
