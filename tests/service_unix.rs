//! Service-layer tests over a real unix domain socket.

#![cfg(unix)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use object_bus::config::ClientConfig;
use object_bus::prelude::*;
use object_bus::service;
use tokio::sync::mpsc;

#[tokio::test]
async fn serve_and_invoke_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bus.ipc");
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    let server = tokio::spawn(service::serve_with_shutdown(
        path.clone(),
        ConnectionOptions::server(),
        |conn: &Connection| {
            conn.bind(
                "greeter",
                Arc::new(MethodTable::new("greeter").method("greet", |args, _kwargs| {
                    let who = args
                        .first()
                        .and_then(Value::as_str)
                        .unwrap_or("world")
                        .to_string();
                    Ok(Value::String(format!("hello {who}")))
                })),
            );
        },
        shutdown_rx,
    ));

    // Wait for the listener to come up.
    for _ in 0..100 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let conn = service::connect(&path, ConnectionOptions::client(), |_conn| {})
        .await
        .unwrap();

    let greeting = conn
        .proxy("greeter")
        .call("greet", vec![Value::from("bus")], Kwargs::new())
        .await
        .unwrap();
    assert_eq!(greeting, Value::string("hello bus"));

    // Release the stream so the server can drain, then shut down.
    conn.close();
    drop(conn);
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown_tx.send(()).await.unwrap();
    server.await.unwrap().unwrap();
    assert!(!path.exists(), "socket file not cleaned up");
}

#[tokio::test]
async fn supervised_client_gives_up_after_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.ipc");

    let config = ClientConfig {
        socket_path: path.to_string_lossy().into_owned(),
        connect_timeout: Duration::from_millis(200),
        auto_reconnect: true,
        max_reconnect_attempts: 2,
        reconnect_delay: Duration::from_millis(20),
        reconnect_delay_max: Duration::from_millis(100),
    };

    let result = service::run_supervised(&path, config, ConnectionOptions::client(), |_conn| {}).await;
    assert!(result.is_err(), "supervisor should give up on a dead endpoint");
}
