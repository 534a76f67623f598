//! Configuration loading and validation tests.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use object_bus::config::{
    BusConfig, ConnectionOptions, DEFAULT_SOCKET_PATH, INITIAL_ID_CLIENT, INITIAL_ID_SERVER,
};

#[test]
fn default_config_is_valid() {
    let config = BusConfig::default();
    let errors = config.validate();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    config.validate_strict().expect("default config valid");
}

#[test]
fn defaults_use_bus_socket_path() {
    let config = BusConfig::default();
    assert_eq!(config.server.socket_path, DEFAULT_SOCKET_PATH);
    assert_eq!(config.client.socket_path, DEFAULT_SOCKET_PATH);
}

#[test]
fn toml_roundtrip_preserves_settings() {
    let config = BusConfig::default_with_overrides(|c| {
        c.server.socket_path = "/tmp/test-bus.ipc".into();
        c.connection.reference_types = vec!["controller".into(), "worker".into()];
        c.connection.invoke_timeout = Some(Duration::from_millis(1500));
        c.client.max_reconnect_attempts = 5;
    });

    let toml = toml::to_string_pretty(&config).expect("serialize");
    let parsed = BusConfig::from_toml(&toml).expect("parse");

    assert_eq!(parsed.server.socket_path, "/tmp/test-bus.ipc");
    assert_eq!(
        parsed.connection.reference_types,
        vec!["controller".to_string(), "worker".to_string()]
    );
    assert_eq!(
        parsed.connection.invoke_timeout,
        Some(Duration::from_millis(1500))
    );
    assert_eq!(parsed.client.max_reconnect_attempts, 5);
}

#[test]
fn partial_toml_fills_defaults() {
    let parsed = BusConfig::from_toml(
        r#"
        [server]
        socket_path = "custom.ipc"
        shutdown_timeout = 5000
        max_connections = 10
        "#,
    )
    .expect("parse");

    assert_eq!(parsed.server.socket_path, "custom.ipc");
    assert_eq!(parsed.server.max_connections, 10);
    assert_eq!(parsed.client.socket_path, DEFAULT_SOCKET_PATH);
    assert!(parsed.connection.reference_types.is_empty());
}

#[test]
fn invalid_toml_is_rejected() {
    assert!(BusConfig::from_toml("server = \"not a table\"").is_err());
}

#[test]
fn empty_socket_path_fails_validation() {
    let config = BusConfig::default_with_overrides(|c| c.server.socket_path = String::new());
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("socket path")));
    assert!(config.validate_strict().is_err());
}

#[test]
fn zero_inbox_capacity_fails_validation() {
    let config = BusConfig::default_with_overrides(|c| c.connection.inbox_capacity = 0);
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Inbox capacity")));
}

#[test]
fn reconnect_delay_above_max_fails_validation() {
    let config = BusConfig::default_with_overrides(|c| {
        c.client.reconnect_delay = Duration::from_secs(60);
        c.client.reconnect_delay_max = Duration::from_secs(1);
    });
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Reconnect delay")));
}

#[test]
fn connection_options_roles() {
    let client = ConnectionOptions::client();
    assert_eq!(client.initial_id, INITIAL_ID_CLIENT);
    assert!(client.validate().is_empty());

    let server = ConnectionOptions::server();
    assert_eq!(server.initial_id, INITIAL_ID_SERVER);
    assert!(server.validate().is_empty());
}

#[test]
fn connection_options_reject_bad_initial_id() {
    let mut options = ConnectionOptions::client();
    options.initial_id = 7;
    assert!(!options.validate().is_empty());
}

#[test]
fn connection_options_reject_reference_type_overflow() {
    let options = ConnectionOptions::client()
        .with_reference_types((0..200).map(|i| format!("kind-{i}")));
    assert!(options
        .validate()
        .iter()
        .any(|e| e.contains("reference types")));
}

#[test]
fn config_options_constructors_carry_tuning() {
    let config = BusConfig::default_with_overrides(|c| {
        c.connection.reference_types = vec!["worker".into()];
        c.connection.invoke_timeout = Some(Duration::from_secs(2));
    });

    let client = config.client_options();
    assert_eq!(client.initial_id, INITIAL_ID_CLIENT);
    assert_eq!(client.reference_types, vec!["worker".to_string()]);
    assert_eq!(client.timeout, Some(Duration::from_secs(2)));

    let server = config.server_options();
    assert_eq!(server.initial_id, INITIAL_ID_SERVER);
    assert_eq!(server.reference_types, vec!["worker".to_string()]);
}

#[test]
fn example_config_parses_back() {
    let example = BusConfig::example_config();
    let parsed = BusConfig::from_toml(&example).expect("example config parses");
    assert!(parsed.validate().is_empty());
}
