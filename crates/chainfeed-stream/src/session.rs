//! The per-chain upstream session.
//!
//! One tokio task owns the WebSocket, the subscribe handshake, and the
//! reconnect wait, so cancellation can never orphan a timer: stopping the
//! task stops everything. Decoded transactions and connectivity transitions
//! leave through a single bounded event channel whose consumer (the
//! supervisor) wires them to the store and the subscriber hub; the channel
//! preserves the upstream decode order per chain.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use chainfeed_core::error::TransportError;
use chainfeed_core::{normalize, ChainConfig, Dialect, PendingTx, TxStatus};

use crate::dialect::{Decoded, DialectWire};
use crate::fetch::RpcFetcher;
use crate::jsonrpc::{JsonRpcRequest, SUBSCRIBE_REQUEST_ID};

/// Unnormalizable events are dropped; at most one log line per this many.
const DROP_LOG_INTERVAL: u64 = 1_000_000;

/// Tuning knobs for one session. The defaults match production behavior;
/// tests shrink the backoff.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub chain: ChainConfig,
    pub dialect: Dialect,
    /// First reconnect delay; doubles per failed attempt up to `max_backoff`
    /// and resets after a connection that reached streaming.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub ping_interval: Duration,
}

impl SessionConfig {
    pub fn new(chain: ChainConfig) -> Self {
        let dialect = Dialect::for_chain(chain.id);
        Self {
            chain,
            dialect,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Everything a session reports to its consumer. The chain id is implied by
/// which session the channel belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transaction(PendingTx),
    Connected,
    Disconnected,
}

/// Observable lifecycle of a session, mainly for tests and liveness probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Subscribing,
    Streaming,
    Closed,
}

/// Handle returned by [`UpstreamSession::spawn`].
pub struct SessionHandle {
    pub chain_id: u64,
    pub task: JoinHandle<()>,
    pub state: watch::Receiver<SessionState>,
}

pub struct UpstreamSession {
    config: SessionConfig,
    events: mpsc::Sender<SessionEvent>,
    stop: watch::Receiver<bool>,
    state_tx: watch::Sender<SessionState>,
    fetcher: RpcFetcher,
    dropped: u64,
}

enum StreamEnd {
    /// Supervisor asked us to stop (or the consumer went away).
    Stopped,
    /// Connection lost; reconnect after backoff.
    Lost { was_streaming: bool },
}

enum FrameOutcome {
    Continue,
    NowStreaming,
    SubscribeRejected,
    Stopped,
}

impl UpstreamSession {
    /// Spawn the session task. It runs until `stop` flips to true (or its
    /// sender is dropped) and owns both the socket and the reconnect wait.
    pub fn spawn(
        config: SessionConfig,
        events: mpsc::Sender<SessionEvent>,
        stop: watch::Receiver<bool>,
    ) -> SessionHandle {
        let chain_id = config.chain.id;
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let fetcher = RpcFetcher::new(config.chain.http_url());
        let session = Self {
            config,
            events,
            stop,
            state_tx,
            fetcher,
            dropped: 0,
        };
        let task = tokio::spawn(session.run());
        SessionHandle {
            chain_id,
            task,
            state: state_rx,
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    async fn run(mut self) {
        let chain = self.config.chain.id;
        info!(chain, dialect = %self.config.dialect, "upstream session starting");

        let mut backoff = self.config.initial_backoff;
        loop {
            if self.stop_requested() {
                break;
            }
            self.set_state(SessionState::Connecting);

            match self.connect_and_stream().await {
                Ok(StreamEnd::Stopped) => break,
                Ok(StreamEnd::Lost { was_streaming }) => {
                    if was_streaming {
                        backoff = self.config.initial_backoff;
                    }
                    if self.events.send(SessionEvent::Disconnected).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(chain, error = %e, "upstream connection failed");
                    if self.events.send(SessionEvent::Disconnected).await.is_err() {
                        break;
                    }
                }
            }

            self.set_state(SessionState::Closed);
            debug!(chain, delay_ms = backoff.as_millis() as u64, "reconnecting after backoff");

            let mut stop = self.stop.clone();
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = wait_for_stop(&mut stop) => break,
            }
            backoff = (backoff * 2).min(self.config.max_backoff);
        }

        self.set_state(SessionState::Closed);
        info!(chain, "upstream session stopped");
    }

    /// One connection attempt: connect, subscribe, stream until the socket
    /// dies or a stop arrives. The socket is dropped on return.
    async fn connect_and_stream(&mut self) -> Result<StreamEnd, TransportError> {
        let chain = self.config.chain.id;
        let mut stop = self.stop.clone();

        let ws = tokio::select! {
            res = connect_async(&self.config.chain.ws_url) => {
                res.map_err(|e| TransportError::WebSocket(e.to_string()))?.0
            }
            _ = wait_for_stop(&mut stop) => return Ok(StreamEnd::Stopped),
        };
        self.set_state(SessionState::Open);

        let (mut sink, mut stream) = ws.split();

        let req = JsonRpcRequest::new(
            SUBSCRIBE_REQUEST_ID,
            "eth_subscribe",
            self.config.dialect.subscribe_params(),
        );
        let frame = serde_json::to_string(&req).map_err(TransportError::Deserialization)?;
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        self.set_state(SessionState::Subscribing);

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // An interval's first tick completes immediately; consume it so the
        // first real ping goes out one full period after connect.
        ping.tick().await;

        let mut streaming = false;
        loop {
            tokio::select! {
                _ = wait_for_stop(&mut stop) => return Ok(StreamEnd::Stopped),

                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        return Ok(StreamEnd::Lost { was_streaming: streaming });
                    }
                }

                msg = stream.next() => match msg {
                    None => return Ok(StreamEnd::Lost { was_streaming: streaming }),
                    Some(Err(e)) => {
                        warn!(chain, error = %e, "websocket read error");
                        return Ok(StreamEnd::Lost { was_streaming: streaming });
                    }
                    Some(Ok(Message::Text(text))) => {
                        match self.handle_frame(&text).await {
                            FrameOutcome::Continue => {}
                            FrameOutcome::NowStreaming => streaming = true,
                            FrameOutcome::SubscribeRejected => {
                                return Ok(StreamEnd::Lost { was_streaming: false });
                            }
                            FrameOutcome::Stopped => return Ok(StreamEnd::Stopped),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Ok(StreamEnd::Lost { was_streaming: streaming });
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    async fn handle_frame(&mut self, text: &str) -> FrameOutcome {
        let chain = self.config.chain.id;

        let v: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!(chain, error = %e, "discarding undecodable frame");
                return FrameOutcome::Continue;
            }
        };

        // Response to our single subscribe request.
        if v.get("id").and_then(Value::as_u64) == Some(SUBSCRIBE_REQUEST_ID) {
            if let Some(err) = v.get("error") {
                error!(chain, error = %err, "subscription rejected by upstream");
                return FrameOutcome::SubscribeRejected;
            }
            let sub_id = v.get("result").and_then(Value::as_str).unwrap_or_default();
            info!(chain, subscription = sub_id, "subscription active");
            self.set_state(SessionState::Streaming);
            if self.events.send(SessionEvent::Connected).await.is_err() {
                return FrameOutcome::Stopped;
            }
            return FrameOutcome::NowStreaming;
        }

        if v.get("method").and_then(Value::as_str) != Some("eth_subscription") {
            return FrameOutcome::Continue;
        }
        let Some(result) = v.get("params").and_then(|p| p.get("result")) else {
            return FrameOutcome::Continue;
        };

        match self.config.dialect.decode_notification(result) {
            Decoded::Tx { raw, status } => self.emit_raw(&raw, status).await,

            Decoded::FetchTx { hash } => match self.fetcher.transaction_by_hash(&hash).await {
                // Null result: mined or evicted between notify and lookup.
                Ok(None) => FrameOutcome::Continue,
                Ok(Some(raw)) => self.emit_raw(&raw, TxStatus::Pending).await,
                Err(e) if e.is_not_found() => FrameOutcome::Continue,
                Err(e) => {
                    warn!(chain, tx = %hash, error = %e, "transaction lookup failed");
                    FrameOutcome::Continue
                }
            },

            Decoded::FetchBlock { number } => match self.fetcher.block_by_number(&number).await {
                Ok(Some(block)) => {
                    let txs = block
                        .get("transactions")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    for raw in &txs {
                        if let FrameOutcome::Stopped =
                            self.emit_raw(raw, TxStatus::Confirmed).await
                        {
                            return FrameOutcome::Stopped;
                        }
                    }
                    FrameOutcome::Continue
                }
                Ok(None) => FrameOutcome::Continue,
                Err(e) => {
                    warn!(chain, block = %number, error = %e, "block fetch failed");
                    FrameOutcome::Continue
                }
            },

            Decoded::Skip => FrameOutcome::Continue,
        }
    }

    async fn emit_raw(&mut self, raw: &Value, status: TxStatus) -> FrameOutcome {
        match normalize(raw, self.config.chain.id, status) {
            Ok(tx) => {
                if self.events.send(SessionEvent::Transaction(tx)).await.is_err() {
                    return FrameOutcome::Stopped;
                }
                FrameOutcome::Continue
            }
            Err(e) => {
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % DROP_LOG_INTERVAL == 0 {
                    warn!(
                        chain = self.config.chain.id,
                        dropped = self.dropped,
                        error = %e,
                        "dropping unnormalizable event"
                    );
                }
                FrameOutcome::Continue
            }
        }
    }
}

/// Resolves when stop flips to true or its sender is gone.
async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}
