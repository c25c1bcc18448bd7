//! End-to-end session tests against a scripted local upstream.
//!
//! The mock upstream is a plain tokio TCP listener speaking the WebSocket
//! subscription protocol (and, for the fetch dialects, a minimal HTTP
//! JSON-RPC responder), so these tests exercise the real connect/subscribe/
//! stream/reconnect path without any network dependency.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use chainfeed_core::{ChainConfig, Dialect, TxStatus};
use chainfeed_stream::{SessionConfig, SessionEvent, SessionState, UpstreamSession};

// ─── Mock upstream helpers ───────────────────────────────────────────────────

fn chain(port: u16, rpc_url: Option<String>) -> ChainConfig {
    ChainConfig {
        id: 1,
        name: "testchain".into(),
        ws_url: format!("ws://127.0.0.1:{port}"),
        rpc_url,
    }
}

fn fast_config(chain: ChainConfig, dialect: Dialect) -> SessionConfig {
    SessionConfig {
        chain,
        dialect,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_millis(400),
        ping_interval: Duration::from_secs(30),
    }
}

async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Read frames until the subscribe request arrives.
async fn read_subscribe(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await.expect("socket closed early").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, v: Value) {
    ws.send(Message::Text(v.to_string())).await.unwrap();
}

async fn ack_subscribe(ws: &mut WebSocketStream<TcpStream>, sub_id: &str) {
    send_json(ws, json!({"jsonrpc": "2.0", "id": 1, "result": sub_id})).await;
}

fn notification(sub_id: &str, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "eth_subscription",
        "params": {"subscription": sub_id, "result": result}
    })
}

fn sample_tx(hash: &str) -> Value {
    json!({
        "hash": hash,
        "from": "0x0100000000000000000000000000000000000001",
        "to": "0x0200000000000000000000000000000000000002",
        "value": "0xde0b6b3a7640000",
        "gas": "0x5208",
        "gasPrice": "0x4a817c800",
        "input": "0x",
        "nonce": "0x5",
        "type": "0x0"
    })
}

async fn recv_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

async fn join_session(handle: chainfeed_stream::SessionHandle) {
    tokio::time::timeout(Duration::from_secs(5), handle.task)
        .await
        .expect("session did not stop in time")
        .unwrap();
}

// ─── Minimal HTTP JSON-RPC responder ─────────────────────────────────────────

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_http_body(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "client closed before request completed");
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .map(|v| v.trim().parse::<usize>().unwrap())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&tmp[..n]);
    }
    buf[header_end..header_end + content_length].to_vec()
}

/// Serve JSON-RPC `result` payloads in order, one per request, recording the
/// requests it saw. Requests past the script get `null` results.
fn spawn_http_rpc(
    listener: TcpListener,
    mut results: Vec<Value>,
    seen: mpsc::UnboundedSender<Value>,
) {
    results.reverse();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let body = read_http_body(&mut stream).await;
            let request: Value = serde_json::from_slice(&body).unwrap();
            let id = request["id"].clone();
            let _ = seen.send(request);

            let result = results.pop().unwrap_or(Value::Null);
            let resp_body = json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string();
            let resp = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                resp_body.len(),
                resp_body
            );
            stream.write_all(resp.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        }
    });
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_pending_stream_delivers_normalized_tx() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = accept_ws(&listener).await;
        let req = read_subscribe(&mut ws).await;
        assert_eq!(req["method"], "eth_subscribe");
        assert_eq!(req["id"], 1);
        assert_eq!(req["params"][0], "alchemy_pendingTransactions");
        assert_eq!(req["params"][1]["hashesOnly"], false);

        ack_subscribe(&mut ws, "0xsub1").await;
        send_json(&mut ws, notification("0xsub1", sample_tx("0xaa01"))).await;

        // Hold the socket open until the client hangs up.
        while ws.next().await.transpose().ok().flatten().is_some() {}
    });

    let (events_tx, mut events) = mpsc::channel(64);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = UpstreamSession::spawn(
        fast_config(chain(port, None), Dialect::FullPending),
        events_tx,
        stop_rx,
    );

    assert_eq!(recv_event(&mut events).await, SessionEvent::Connected);
    match recv_event(&mut events).await {
        SessionEvent::Transaction(tx) => {
            assert_eq!(tx.hash, "0xaa01");
            assert_eq!(tx.chain_id, 1);
            assert_eq!(tx.value, "1000000000000000000");
            assert_eq!(tx.gas_limit, "21000");
            assert_eq!(tx.gas_price, "20000000000");
            assert_eq!(tx.status, TxStatus::Pending);
        }
        other => panic!("expected transaction, got {other:?}"),
    }

    stop_tx.send(true).unwrap();
    join_session(handle).await;
    server.abort();
}

#[tokio::test]
async fn reconnects_after_upstream_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        // First connection: subscribe, then close from the server side.
        let mut ws = accept_ws(&listener).await;
        read_subscribe(&mut ws).await;
        ack_subscribe(&mut ws, "0xfirst").await;
        ws.close(None).await.unwrap();

        // Second connection: the session resubscribes with a fresh id.
        let mut ws = accept_ws(&listener).await;
        let req = read_subscribe(&mut ws).await;
        assert_eq!(req["method"], "eth_subscribe");
        ack_subscribe(&mut ws, "0xsecond").await;
        while ws.next().await.transpose().ok().flatten().is_some() {}
    });

    let (events_tx, mut events) = mpsc::channel(64);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = UpstreamSession::spawn(
        fast_config(chain(port, None), Dialect::FullPending),
        events_tx,
        stop_rx,
    );

    // Connected, then disconnected, then connected again: the two
    // chain-status transitions arrive in order around the reconnect.
    assert_eq!(recv_event(&mut events).await, SessionEvent::Connected);
    assert_eq!(recv_event(&mut events).await, SessionEvent::Disconnected);
    assert_eq!(recv_event(&mut events).await, SessionEvent::Connected);

    stop_tx.send(true).unwrap();
    join_session(handle).await;
    server.abort();
}

#[tokio::test]
async fn subscribe_rejection_triggers_reconnect_with_same_dialect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = accept_ws(&listener).await;
        let first = read_subscribe(&mut ws).await;
        send_json(
            &mut ws,
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "method not found"}}),
        )
        .await;
        // The session drops the socket; accept the retry.
        let mut ws = accept_ws(&listener).await;
        let second = read_subscribe(&mut ws).await;
        assert_eq!(first["params"], second["params"]);
        ack_subscribe(&mut ws, "0xretry").await;
        while ws.next().await.transpose().ok().flatten().is_some() {}
    });

    let (events_tx, mut events) = mpsc::channel(64);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = UpstreamSession::spawn(
        fast_config(chain(port, None), Dialect::HashOnlyPending),
        events_tx,
        stop_rx,
    );

    assert_eq!(recv_event(&mut events).await, SessionEvent::Disconnected);
    assert_eq!(recv_event(&mut events).await, SessionEvent::Connected);

    stop_tx.send(true).unwrap();
    join_session(handle).await;
    server.abort();
}

#[tokio::test]
async fn mined_dialect_skips_removed_transactions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = accept_ws(&listener).await;
        let req = read_subscribe(&mut ws).await;
        assert_eq!(req["params"][0], "alchemy_minedTransactions");
        ack_subscribe(&mut ws, "0xmined").await;

        // Reorged-out transaction first, then a kept one.
        send_json(
            &mut ws,
            notification("0xmined", json!({"removed": true, "transaction": sample_tx("0xgone")})),
        )
        .await;
        send_json(
            &mut ws,
            notification("0xmined", json!({"removed": false, "transaction": sample_tx("0xkept")})),
        )
        .await;
        while ws.next().await.transpose().ok().flatten().is_some() {}
    });

    let (events_tx, mut events) = mpsc::channel(64);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = UpstreamSession::spawn(
        fast_config(chain(port, None), Dialect::FullMined),
        events_tx,
        stop_rx,
    );

    assert_eq!(recv_event(&mut events).await, SessionEvent::Connected);
    // The first transaction to arrive is the kept one: the removed
    // notification produced nothing.
    match recv_event(&mut events).await {
        SessionEvent::Transaction(tx) => {
            assert_eq!(tx.hash, "0xkept");
            assert_eq!(tx.status, TxStatus::Confirmed);
        }
        other => panic!("expected transaction, got {other:?}"),
    }

    stop_tx.send(true).unwrap();
    join_session(handle).await;
    server.abort();
}

#[tokio::test]
async fn hash_only_dialect_fetches_and_drops_missing() {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = ws_listener.local_addr().unwrap().port();
    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_port = http_listener.local_addr().unwrap().port();

    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    // First lookup misses (tx mined in between), second returns the body.
    spawn_http_rpc(
        http_listener,
        vec![Value::Null, sample_tx("0xfound")],
        seen_tx,
    );

    let server = tokio::spawn(async move {
        let mut ws = accept_ws(&ws_listener).await;
        let req = read_subscribe(&mut ws).await;
        assert_eq!(req["params"][0], "newPendingTransactions");
        ack_subscribe(&mut ws, "0xhashes").await;
        send_json(&mut ws, notification("0xhashes", json!("0xmissing"))).await;
        send_json(&mut ws, notification("0xhashes", json!("0xfound"))).await;
        while ws.next().await.transpose().ok().flatten().is_some() {}
    });

    let (events_tx, mut events) = mpsc::channel(64);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = UpstreamSession::spawn(
        fast_config(
            chain(ws_port, Some(format!("http://127.0.0.1:{http_port}"))),
            Dialect::HashOnlyPending,
        ),
        events_tx,
        stop_rx,
    );

    assert_eq!(recv_event(&mut events).await, SessionEvent::Connected);
    match recv_event(&mut events).await {
        SessionEvent::Transaction(tx) => {
            assert_eq!(tx.hash, "0xfound");
            assert_eq!(tx.status, TxStatus::Pending);
        }
        other => panic!("expected transaction, got {other:?}"),
    }

    let first = seen.recv().await.unwrap();
    assert_eq!(first["method"], "eth_getTransactionByHash");
    assert_eq!(first["params"][0], "0xmissing");

    stop_tx.send(true).unwrap();
    join_session(handle).await;
    server.abort();
}

#[tokio::test]
async fn headers_dialect_fetches_block_and_confirms_all() {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = ws_listener.local_addr().unwrap().port();
    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_port = http_listener.local_addr().unwrap().port();

    let block = json!({
        "number": "0x10",
        "hash": "0xblockhash",
        "transactions": [sample_tx("0xb1"), sample_tx("0xb2")]
    });
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    spawn_http_rpc(http_listener, vec![block], seen_tx);

    let server = tokio::spawn(async move {
        let mut ws = accept_ws(&ws_listener).await;
        let req = read_subscribe(&mut ws).await;
        assert_eq!(req["params"][0], "newHeads");
        ack_subscribe(&mut ws, "0xheads").await;
        send_json(&mut ws, notification("0xheads", json!({"number": "0x10"}))).await;
        while ws.next().await.transpose().ok().flatten().is_some() {}
    });

    let (events_tx, mut events) = mpsc::channel(64);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = UpstreamSession::spawn(
        fast_config(
            chain(ws_port, Some(format!("http://127.0.0.1:{http_port}"))),
            Dialect::HeadersThenFetch,
        ),
        events_tx,
        stop_rx,
    );

    assert_eq!(recv_event(&mut events).await, SessionEvent::Connected);
    for expected in ["0xb1", "0xb2"] {
        match recv_event(&mut events).await {
            SessionEvent::Transaction(tx) => {
                assert_eq!(tx.hash, expected);
                assert_eq!(tx.status, TxStatus::Confirmed);
            }
            other => panic!("expected transaction, got {other:?}"),
        }
    }

    let req = seen.recv().await.unwrap();
    assert_eq!(req["method"], "eth_getBlockByNumber");
    assert_eq!(req["params"][0], "0x10");
    assert_eq!(req["params"][1], true);

    stop_tx.send(true).unwrap();
    join_session(handle).await;
    server.abort();
}

#[tokio::test]
async fn stop_cancels_pending_reconnect() {
    // Grab a port with nothing listening so every connect fails fast.
    let dead_port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };

    let mut config = fast_config(chain(dead_port, None), Dialect::FullPending);
    // Long enough that a surviving timer would fail the join below.
    config.initial_backoff = Duration::from_secs(30);
    config.max_backoff = Duration::from_secs(30);

    let (events_tx, mut events) = mpsc::channel(64);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = UpstreamSession::spawn(config, events_tx, stop_rx);

    // The failed attempt surfaces as a disconnect, then the session parks in
    // its backoff wait.
    assert_eq!(recv_event(&mut events).await, SessionEvent::Disconnected);

    stop_tx.send(true).unwrap();
    let mut state = handle.state.clone();
    join_session(handle).await;
    assert_eq!(*state.borrow_and_update(), SessionState::Closed);
}
