//! The downstream WebSocket wire protocol.
//!
//! Frames are JSON text, discriminated by a `type` field in both directions.
//! Anything a client sends that doesn't parse as a [`ClientMessage`] is
//! silently ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chainfeed_core::{ChainStatus, PendingTx};

/// Server → subscriber pushes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Sent once, immediately after the connection is accepted.
    Connected { timestamp: DateTime<Utc> },
    /// Acknowledges a filter change; `chains` is the active filter
    /// (empty = all chains).
    Subscribed { chains: Vec<u64> },
    Pong,
    Transaction { data: PendingTx },
    #[serde(rename_all = "camelCase")]
    ChainStatus { chain_id: u64, status: ChainStatus },
}

/// Subscriber → server requests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Replace the chain filter with the given set.
    Subscribe {
        #[serde(default)]
        chains: Vec<u64>,
    },
    /// Clear the filter (back to "all chains").
    Unsubscribe,
    Ping,
}
