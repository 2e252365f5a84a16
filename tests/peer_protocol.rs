use rpc_peer::{CancellationToken, Encoding, FrameWriter, ParamSpec, PeerState, Rpc, RpcError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{split, DuplexStream, ReadHalf, WriteHalf};
use tokio::time::{timeout, Duration};

type Halves = (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>);

fn connected_pair(capacity: usize) -> (Halves, Halves) {
    let (a, b) = tokio::io::duplex(capacity);
    (split(a), split(b))
}

#[tokio::test]
async fn large_string_echo_round_trips_without_framing_errors() {
    let ((client_read, client_write), (server_read, server_write)) = connected_pair(4 * 1024 * 1024);

    let server = Rpc::builder()
        .receiving_stream(server_read)
        .sending_stream(server_write)
        .method(
            "ServerMethod",
            vec![ParamSpec::required::<String>("arg")],
            false,
            |args, _cancel| async move {
                let arg = args.into_iter().next().unwrap();
                let arg = arg.as_str().unwrap();
                Ok(Value::from(format!("{arg}!")))
            },
        )
        .build()
        .expect("server builds");

    let client = Rpc::builder()
        .sending_stream(client_write)
        .receiving_stream(client_read)
        .build()
        .expect("client builds");

    let mut payload = "TestLine1".to_string();
    payload.push_str(&"a".repeat(1_048_576));

    let result = timeout(
        Duration::from_secs(10),
        client.invoke("ServerMethod", Value::from(payload.clone())),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");

    assert_eq!(result, Value::from(format!("{payload}!")));
    drop(server);
}

#[tokio::test]
async fn null_params_are_reachable_and_zero_arity_rejects_them() {
    let ((client_read, client_write), (server_read, server_write)) = connected_pair(64 * 1024);

    let server = Rpc::builder()
        .receiving_stream(server_read)
        .sending_stream(server_write)
        .method(
            "MethodThatAcceptsAndReturnsNull",
            vec![ParamSpec::required::<Value>("value")],
            false,
            |args, _cancel| async move {
                let value = args.into_iter().next().unwrap_or(Value::Null);
                assert_eq!(value, Value::Null);
                Ok(Value::Null)
            },
        )
        .method(
            "MethodThatAcceptsNothingAndReturnsNull",
            vec![],
            false,
            |_args, _cancel| async { Ok(Value::Null) },
        )
        .build()
        .expect("server builds");

    let client = Rpc::builder()
        .sending_stream(client_write)
        .receiving_stream(client_read)
        .build()
        .expect("client builds");

    let via_array = timeout(
        Duration::from_secs(2),
        client.invoke(
            "MethodThatAcceptsAndReturnsNull",
            Value::Array(vec![Value::Null]),
        ),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");
    assert_eq!(via_array, Value::Null);

    let via_null = timeout(
        Duration::from_secs(2),
        client.invoke("MethodThatAcceptsAndReturnsNull", Value::Null),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");
    assert_eq!(via_null, Value::Null);

    let not_found = timeout(
        Duration::from_secs(2),
        client.invoke("MethodThatAcceptsNothingAndReturnsNull", Value::Null),
    )
    .await
    .expect("invoke timed out");
    assert!(matches!(not_found, Err(RpcError::RemoteMethodNotFound(_))));
}

#[tokio::test]
async fn async_suffix_aliasing_resolves_per_scenario() {
    let ((client_read, client_write), (server_read, server_write)) = connected_pair(64 * 1024);

    let server = Rpc::builder()
        .receiving_stream(server_read)
        .sending_stream(server_write)
        .method("MethodThatEndsInAsync", vec![], false, |_args, _cancel| async {
            Ok(Value::from(3))
        })
        .method("MethodThatMayEndInAsync", vec![], false, |_args, _cancel| async {
            Ok(Value::from(4))
        })
        .method("MethodThatMayEndIn", vec![], false, |_args, _cancel| async {
            Ok(Value::from(5))
        })
        .build()
        .expect("server builds");

    let client = Rpc::builder()
        .sending_stream(client_write)
        .receiving_stream(client_read)
        .build()
        .expect("client builds");

    let via_alias = timeout(
        Duration::from_secs(2),
        client.invoke("MethodThatEndsIn", Value::Array(vec![])),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");
    assert_eq!(via_alias, Value::from(3));

    let via_async_exact = timeout(
        Duration::from_secs(2),
        client.invoke("MethodThatMayEndInAsync", Value::Array(vec![])),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");
    assert_eq!(via_async_exact, Value::from(4));

    let via_bare_exact = timeout(
        Duration::from_secs(2),
        client.invoke("MethodThatMayEndIn", Value::Array(vec![])),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");
    assert_eq!(via_bare_exact, Value::from(5));
}

#[tokio::test]
async fn cancellation_emits_wire_notification_and_surfaces_as_remote_failure() {
    let ((client_read, client_write), (server_read, server_write)) = connected_pair(64 * 1024);

    let (began_tx, began_rx) = tokio::sync::oneshot::channel();
    let began_tx = Arc::new(Mutex::new(Some(began_tx)));

    let server = Rpc::builder()
        .receiving_stream(server_read)
        .sending_stream(server_write)
        .method(
            "AsyncMethodWithCancellation",
            vec![ParamSpec::required::<String>("value")],
            true,
            move |_args, cancel| {
                let began_tx = began_tx.clone();
                async move {
                    if let Some(tx) = began_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                    let cancel = cancel.expect("cancellation token supplied for an accepting method");
                    cancel.cancelled().await;
                    Err(RpcError::Canceled)
                }
            },
        )
        .build()
        .expect("server builds");

    let client = Rpc::builder()
        .sending_stream(client_write)
        .receiving_stream(client_read)
        .build()
        .expect("client builds");

    let (token, trigger) = CancellationToken::new();
    let call = client.invoke_with_cancellation(
        "AsyncMethodWithCancellation",
        Value::Array(vec![Value::from("go")]),
        token,
    );

    timeout(Duration::from_secs(2), began_rx)
        .await
        .expect("handler never started")
        .expect("began channel dropped");
    trigger.cancel();

    let result = timeout(Duration::from_secs(2), call)
        .await
        .expect("invoke timed out");
    match result {
        Err(RpcError::RemoteInvocationFailure { remote_code, .. }) => assert_eq!(remote_code, None),
        other => panic!("expected RemoteInvocationFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_sending_stream_is_fatal_for_requests_but_not_preceding_notifications() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let (_a_read, a_write) = split(a);
    let (b_read, _b_write) = split(b);

    let (ping_tx, ping_rx) = tokio::sync::oneshot::channel();
    let ping_tx = Arc::new(Mutex::new(Some(ping_tx)));
    let request_invoked = Arc::new(AtomicBool::new(false));
    let request_invoked2 = request_invoked.clone();

    let server = Rpc::builder()
        .receiving_stream(b_read)
        .method("Ping", vec![], false, move |_args, _cancel| {
            let ping_tx = ping_tx.clone();
            async move {
                if let Some(tx) = ping_tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                Ok(Value::Null)
            }
        })
        .method("ShouldNotRun", vec![], false, move |_args, _cancel| {
            let request_invoked2 = request_invoked2.clone();
            async move {
                request_invoked2.store(true, Ordering::SeqCst);
                Ok(Value::Null)
            }
        })
        .build()
        .expect("a receiving-only peer is valid");

    let disconnected = Arc::new(tokio::sync::Notify::new());
    let disconnected2 = disconnected.clone();
    let description = Arc::new(Mutex::new(String::new()));
    let description2 = description.clone();
    server.on_disconnect(move |event| {
        *description2.lock().unwrap() = event.description.clone();
        disconnected2.notify_waiters();
    });

    let mut framer = FrameWriter::new(a_write);
    framer
        .write_frame(r#"{"jsonrpc":"2.0","method":"Ping","params":[]}"#, Encoding::Utf8)
        .await
        .expect("write ping");
    framer
        .write_frame(
            r#"{"jsonrpc":"2.0","id":1,"method":"ShouldNotRun","params":[]}"#,
            Encoding::Utf8,
        )
        .await
        .expect("write request");

    timeout(Duration::from_secs(2), ping_rx)
        .await
        .expect("ping notification was never delivered")
        .expect("ping channel dropped");

    timeout(Duration::from_secs(2), disconnected.notified())
        .await
        .expect("peer never disconnected");

    assert!(!request_invoked.load(Ordering::SeqCst));
    assert!(!description.lock().unwrap().is_empty());
    assert_eq!(server.state(), PeerState::Disconnected);
}

#[tokio::test]
async fn virtual_and_redeclared_methods_resolve_to_final_registration() {
    let ((client_read, client_write), (server_read, server_write)) = connected_pair(64 * 1024);

    let server = Rpc::builder()
        .receiving_stream(server_read)
        .sending_stream(server_write)
        .method("BaseMethod", vec![], false, |_args, _cancel| async {
            Ok(Value::from("base"))
        })
        .method("VirtualBaseMethod", vec![], false, |_args, _cancel| async {
            Ok(Value::from("base"))
        })
        .method("RedeclaredBaseMethod", vec![], false, |_args, _cancel| async {
            Ok(Value::from("base"))
        })
        // The "derived type" overrides/redeclares both of the above.
        .method("VirtualBaseMethod", vec![], false, |_args, _cancel| async {
            Ok(Value::from("child"))
        })
        .method("RedeclaredBaseMethod", vec![], false, |_args, _cancel| async {
            Ok(Value::from("child"))
        })
        .build()
        .expect("server builds");

    let client = Rpc::builder()
        .sending_stream(client_write)
        .receiving_stream(client_read)
        .build()
        .expect("client builds");

    let base = timeout(
        Duration::from_secs(2),
        client.invoke("BaseMethod", Value::Array(vec![])),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");
    let virtual_result = timeout(
        Duration::from_secs(2),
        client.invoke("VirtualBaseMethod", Value::Array(vec![])),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");
    let redeclared = timeout(
        Duration::from_secs(2),
        client.invoke("RedeclaredBaseMethod", Value::Array(vec![])),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");

    assert_eq!(base, Value::from("base"));
    assert_eq!(virtual_result, Value::from("child"));
    assert_eq!(redeclared, Value::from("child"));
}

#[tokio::test]
async fn overload_disambiguation_picks_a_matching_candidate_or_fails() {
    let ((client_read, client_write), (server_read, server_write)) = connected_pair(64 * 1024);

    let server = Rpc::builder()
        .receiving_stream(server_read)
        .sending_stream(server_write)
        .method(
            "Overloaded",
            vec![ParamSpec::required::<String>("a")],
            false,
            |_args, _cancel| async { Ok(Value::from("string")) },
        )
        .method(
            "Overloaded",
            vec![ParamSpec::required::<i64>("a")],
            false,
            |_args, _cancel| async { Ok(Value::from("number")) },
        )
        .build()
        .expect("server builds");

    let client = Rpc::builder()
        .sending_stream(client_write)
        .receiving_stream(client_read)
        .build()
        .expect("client builds");

    let via_string = timeout(
        Duration::from_secs(2),
        client.invoke("Overloaded", Value::Array(vec![Value::from("hi")])),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");
    assert_eq!(via_string, Value::from("string"));

    let via_number = timeout(
        Duration::from_secs(2),
        client.invoke("Overloaded", Value::Array(vec![Value::from(5)])),
    )
    .await
    .expect("invoke timed out")
    .expect("invoke ok");
    assert_eq!(via_number, Value::from("number"));

    let no_match = timeout(
        Duration::from_secs(2),
        client.invoke("Overloaded", Value::Array(vec![Value::from(true)])),
    )
    .await
    .expect("invoke timed out");
    assert!(matches!(no_match, Err(RpcError::RemoteMethodNotFound(_))));
}

#[tokio::test]
async fn request_to_a_peer_with_no_target_is_rejected_not_fatal() {
    let ((client_read, client_write), (server_read, server_write)) = connected_pair(64 * 1024);

    // A peer with both streams but zero registered methods ("no target")
    // rejects inbound requests without tearing down the connection,
    // unlike the missing-sending-stream case.
    let server = Rpc::builder()
        .receiving_stream(server_read)
        .sending_stream(server_write)
        .build()
        .expect("server builds");

    let client = Rpc::builder()
        .sending_stream(client_write)
        .receiving_stream(client_read)
        .build()
        .expect("client builds");

    let result = timeout(
        Duration::from_secs(2),
        client.invoke("Anything", Value::Array(vec![])),
    )
    .await
    .expect("invoke timed out");
    assert!(matches!(result, Err(RpcError::RemoteMethodNotFound(_))));
    assert_eq!(server.state(), PeerState::Active);
}

#[tokio::test]
async fn disposing_a_peer_twice_is_idempotent() {
    let ((client_read, client_write), _server_half) = connected_pair(4096);

    let peer = Rpc::builder()
        .sending_stream(client_write)
        .receiving_stream(client_read)
        .build()
        .expect("peer builds");

    let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let fired2 = fired.clone();
    peer.on_disconnect(move |_| {
        fired2.fetch_add(1, Ordering::SeqCst);
    });

    peer.dispose();
    peer.dispose();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(peer.state(), PeerState::Disconnected);
}
