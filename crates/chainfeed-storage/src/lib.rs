//! chainfeed-storage — persistence for normalized transactions.
//!
//! The store is an at-least-once sink: sessions may hand it the same hash
//! many times (reconnect storms, racing dialects) and every backend absorbs
//! the duplicates while keeping status transitions monotone
//! (pending → confirmed, never back).

pub mod memory;
pub mod sqlite;

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chainfeed_core::error::StoreError;
use chainfeed_core::{ChainConfig, PendingTx, TxStatus};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Hard cap on page size for historical queries.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Sort key whitelist for [`TxQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderBy {
    #[default]
    Timestamp,
    Value,
    GasPrice,
    Nonce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// A bounded historical query over the retained window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TxQuery {
    pub chain_id: Option<u64>,
    /// Case-insensitive prefix match on the sender address.
    pub from_prefix: Option<String>,
    /// Case-insensitive prefix match on the recipient address.
    pub to_prefix: Option<String>,
    pub status: Option<TxStatus>,
    pub order_by: OrderBy,
    pub order: SortOrder,
    pub limit: u32,
    pub offset: u32,
}

impl TxQuery {
    /// Effective page size (defaults to 50, capped at [`MAX_PAGE_SIZE`]).
    pub fn effective_limit(&self) -> u32 {
        match self.limit {
            0 => 50,
            n => n.min(MAX_PAGE_SIZE),
        }
    }
}

/// One page of query results plus the total matching row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: u64,
}

/// Top sender entry in the aggregate report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderCount {
    pub address: String,
    pub count: u64,
}

/// Periodic aggregate statistics over the retained window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxAggregates {
    pub by_status: HashMap<String, u64>,
    pub by_chain: HashMap<u64, u64>,
    pub top_senders_last_hour: Vec<SenderCount>,
    pub count_last_5min: u64,
}

/// The shared transaction sink and query backend.
///
/// Implementations must be safe for concurrent upserts from every session
/// plus reads from the query surface.
#[async_trait]
pub trait TxStore: Send + Sync {
    /// Insert a new row keyed by hash, or upgrade the status of an existing
    /// one. Duplicate-key races are absorbed silently; a stored `confirmed`
    /// is never downgraded.
    async fn upsert(&self, tx: &PendingTx) -> Result<(), StoreError>;

    async fn find(&self, hash: &str) -> Result<Option<PendingTx>, StoreError>;

    async fn find_page(&self, query: &TxQuery) -> Result<Page<PendingTx>, StoreError>;

    async fn aggregate(&self, chain_id: Option<u64>) -> Result<TxAggregates, StoreError>;

    /// Delete rows older than `cutoff`; returns the number deleted. Invoked
    /// by the retention sweeper.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Insert or update one chain row (supervisor reconciliation at startup).
    async fn upsert_chain(&self, chain: &ChainConfig) -> Result<(), StoreError>;

    async fn chains(&self) -> Result<Vec<ChainConfig>, StoreError>;
}

/// Numeric ordering for non-negative decimal strings with no leading zeros:
/// shorter strings are smaller, equal lengths compare lexicographically.
pub(crate) fn cmp_decimal(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_ordering_is_numeric() {
        assert_eq!(cmp_decimal("9", "10"), Ordering::Less);
        assert_eq!(cmp_decimal("100", "99"), Ordering::Greater);
        assert_eq!(cmp_decimal("21000", "21000"), Ordering::Equal);
        assert_eq!(
            cmp_decimal("1000000000000000000", "999999999999999999"),
            Ordering::Greater
        );
    }

    #[test]
    fn limit_is_clamped() {
        let q = TxQuery { limit: 500, ..Default::default() };
        assert_eq!(q.effective_limit(), MAX_PAGE_SIZE);
        let q = TxQuery::default();
        assert_eq!(q.effective_limit(), 50);
        let q = TxQuery { limit: 10, ..Default::default() };
        assert_eq!(q.effective_limit(), 10);
    }
}
