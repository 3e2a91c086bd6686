//! Config save/load roundtrip integration tests.
//!
//! These tests verify that configuration can be serialized, written to disk,
//! and loaded back with identical field values.

use chatsapp_core::config::{BackendMode, BindMode, Config};
use chatsapp_gateway::GatewayConfig;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chatsapp.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chatsapp.json5");

    let mut config = Config::default();
    config.gateway.port = 9090;
    config.gateway.bind = BindMode::Lan;
    config.backend.mode = BackendMode::Memory;
    config.session.cookie_name = "sid".to_string();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, 9090);
    assert_eq!(loaded.gateway.bind, BindMode::Lan);
    assert_eq!(loaded.backend.mode, BackendMode::Memory);
    assert_eq!(loaded.session.cookie_name, "sid");
}

#[test]
fn test_handwritten_json5() {
    let config = Config::parse(
        r#"{
            // local development
            gateway: { port: 4000, cors_origins: ["http://localhost:5173"] },
            backend: { mode: "memory", request_timeout_ms: 1500 },
            relay: { buffer: 8 },
        }"#,
    )
    .unwrap();
    config.validate().unwrap();

    let gateway = GatewayConfig::from(&config);
    assert_eq!(gateway.port, 4000);
    assert_eq!(gateway.cors_origins, vec!["http://localhost:5173".to_string()]);
    assert_eq!(gateway.relay_buffer, 8);
    assert_eq!(gateway.keep_alive, Duration::from_secs(15));
    assert_eq!(config.backend.request_timeout_ms, 1500);
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/chatsapp.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    let result = Config::parse("not valid json");
    assert!(result.is_err());
}

#[test]
fn test_validation_collects_every_error() {
    let config = Config::parse(
        r#"{ gateway: { port: 0 }, backend: { account_url: "ftp://x" }, relay: { buffer: 0 } }"#,
    )
    .unwrap();
    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("port"), "{}", message);
    assert!(message.contains("account_url"), "{}", message);
    assert!(message.contains("buffer"), "{}", message);
}
