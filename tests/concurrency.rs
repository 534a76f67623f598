//! Concurrent invocations multiplexed over a single connection.
//!
//! Verifies that interleaved transactions keep their message streams
//! independent: every caller sees its own results and yield sequences.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use object_bus::prelude::*;
use object_bus::BlockResult;
use tokio::task::JoinSet;

fn connected_pair() -> (Connection, Connection) {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let client = Connection::new(client_io, ConnectionOptions::client());
    let server = Connection::new(server_io, ConnectionOptions::server());
    for conn in [&client, &server] {
        let conn = conn.clone();
        tokio::spawn(async move {
            let _ = conn.run().await;
        });
    }
    (client, server)
}

struct EchoAfterDelay;

#[async_trait]
impl MethodHandler for EchoAfterDelay {
    async fn handle(
        &self,
        mut args: Vec<Value>,
        _kwargs: Kwargs,
        _block: Option<&mut Yielder<'_>>,
    ) -> CallResult {
        // Stagger completion so replies interleave across transactions.
        let delay = args
            .get(1)
            .and_then(Value::as_i64)
            .unwrap_or(0) as u64;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(args.remove(0))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_stay_independent() {
    let (client, server) = connected_pair();
    server.bind(
        "svc",
        Arc::new(MethodTable::new("svc").handler("echo", EchoAfterDelay)),
    );

    let mut tasks = JoinSet::new();
    for i in 0..16i64 {
        let proxy = client.proxy("svc");
        tasks.spawn(async move {
            // Later calls finish earlier.
            let delay = Value::Integer(80 - i * 5);
            let result = proxy
                .call("echo", vec![Value::Integer(i), delay], Kwargs::new())
                .await
                .unwrap();
            (i, result)
        });
    }

    while let Some(res) = tasks.join_next().await {
        let (i, result) = res.unwrap();
        assert_eq!(result, Value::Integer(i));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.active_transactions(), 0);
    assert_eq!(server.active_transactions(), 0);
}

struct RepeatArg;

#[async_trait]
impl MethodHandler for RepeatArg {
    async fn handle(
        &self,
        args: Vec<Value>,
        _kwargs: Kwargs,
        block: Option<&mut Yielder<'_>>,
    ) -> CallResult {
        let yielder = block.ok_or_else(|| CallFault::runtime("block required"))?;
        let seed = args[0].clone();
        for _ in 0..3 {
            match yielder.yield_value(seed.clone()).await {
                Ok(YieldReply::Next(_)) => {}
                Ok(YieldReply::Closed) => break,
                Err(e) => return Err(CallFault::from(e)),
            }
        }
        Ok(Value::symbol("done"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_yield_streams_do_not_cross() {
    let (client, server) = connected_pair();
    server.bind(
        "svc",
        Arc::new(MethodTable::new("svc").handler("repeat", RepeatArg)),
    );

    let mut tasks = JoinSet::new();
    for i in 0..8i64 {
        let proxy = client.proxy("svc");
        tasks.spawn(async move {
            let mut seen = Vec::new();
            let mut block = BlockFn(|values: Vec<Value>| -> BlockResult {
                seen.push(values[0].as_i64().unwrap());
                Ok(Value::Nil)
            });
            let result = proxy
                .call_with_block("repeat", vec![Value::Integer(i)], Kwargs::new(), &mut block)
                .await
                .unwrap();
            assert_eq!(result, Value::symbol("done"));
            drop(block);
            (i, seen)
        });
    }

    while let Some(res) = tasks.join_next().await {
        let (i, seen) = res.unwrap();
        assert_eq!(seen, vec![i, i, i], "stream for call {i} was contaminated");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bidirectional_invocations_share_the_wire() {
    let (client, server) = connected_pair();

    server.bind(
        "server-svc",
        Arc::new(MethodTable::new("server-svc").method("whoami", |_a, _k| {
            Ok(Value::string("server"))
        })),
    );
    client.bind(
        "client-svc",
        Arc::new(MethodTable::new("client-svc").method("whoami", |_a, _k| {
            Ok(Value::string("client"))
        })),
    );

    let from_client = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .proxy("server-svc")
                .call("whoami", vec![], Kwargs::new())
                .await
                .unwrap()
        })
    };
    let from_server = {
        let server = server.clone();
        tokio::spawn(async move {
            server
                .proxy("client-svc")
                .call("whoami", vec![], Kwargs::new())
                .await
                .unwrap()
        })
    };

    assert_eq!(from_client.await.unwrap(), Value::string("server"));
    assert_eq!(from_server.await.unwrap(), Value::string("client"));
}
