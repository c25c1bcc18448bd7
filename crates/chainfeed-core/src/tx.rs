//! The canonical transaction record.
//!
//! Every upstream dialect is normalized into `PendingTx` before it touches
//! the store or a downstream subscriber. Quantity fields are decimal strings
//! because EVM quantities are 256-bit and consumers are JSON clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an observed transaction.
///
/// Transitions are monotone: `Pending` may become `Confirmed`, never the
/// reverse. `Dropped` is reserved for replacement detection and is not
/// produced by the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Dropped,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Dropped => "dropped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TxStatus::Pending),
            "confirmed" => Some(TxStatus::Confirmed),
            "dropped" => Some(TxStatus::Dropped),
            _ => None,
        }
    }

    /// Whether a stored `self` may be replaced by `next` (invariant: once
    /// confirmed, a re-observation as pending must not downgrade).
    pub fn may_upgrade_to(&self, next: TxStatus) -> bool {
        matches!((self, next), (TxStatus::Pending, TxStatus::Confirmed))
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized transaction as observed from an upstream mempool stream.
///
/// `hash` is the primary key across the whole store. All quantity fields
/// (`value`, `gas_price`, `gas_limit`, fee caps) are base-10 strings with no
/// sign and no leading zeros; the conversion from upstream hex is exact over
/// the full 256-bit range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTx {
    /// 32-byte transaction hash, lowercase hex with 0x prefix.
    pub hash: String,
    pub chain_id: u64,
    /// 20-byte sender address.
    pub from: String,
    /// Recipient, `None` for contract creation.
    pub to: Option<String>,
    pub value: String,
    /// Effective gas price; falls back to `max_fee_per_gas` for EIP-1559
    /// transactions that carry no legacy gas price.
    pub gas_price: String,
    pub gas_limit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    /// Hex calldata, at minimum `"0x"`.
    pub input: String,
    pub nonce: u64,
    /// 0 = legacy, 2 = EIP-1559. Unknown upstream types collapse to 0.
    #[serde(rename = "type")]
    pub tx_type: u8,
    /// Ingestion wall clock at decode time, not a chain timestamp.
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
}
