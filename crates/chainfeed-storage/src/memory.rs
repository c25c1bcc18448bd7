//! In-memory store backend.
//!
//! Mirrors the SQLite backend's semantics in RAM. Used by tests and by
//! ephemeral deployments that don't need the history to survive a restart.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use chainfeed_core::error::StoreError;
use chainfeed_core::{ChainConfig, PendingTx};

use crate::{
    cmp_decimal, OrderBy, Page, SenderCount, SortOrder, TxAggregates, TxQuery, TxStore,
};

/// All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    txs: Mutex<HashMap<String, PendingTx>>,
    chains: Mutex<HashMap<u64, ChainConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.txs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches(tx: &PendingTx, query: &TxQuery) -> bool {
    if let Some(chain_id) = query.chain_id {
        if tx.chain_id != chain_id {
            return false;
        }
    }
    if let Some(prefix) = &query.from_prefix {
        if !tx.from.starts_with(&prefix.to_ascii_lowercase()) {
            return false;
        }
    }
    if let Some(prefix) = &query.to_prefix {
        let prefix = prefix.to_ascii_lowercase();
        match &tx.to {
            Some(to) if to.starts_with(&prefix) => {}
            _ => return false,
        }
    }
    if let Some(status) = query.status {
        if tx.status != status {
            return false;
        }
    }
    true
}

#[async_trait]
impl TxStore for MemoryStore {
    async fn upsert(&self, tx: &PendingTx) -> Result<(), StoreError> {
        let mut txs = self.txs.lock().unwrap();
        match txs.get_mut(&tx.hash) {
            Some(existing) => {
                if existing.status.may_upgrade_to(tx.status) {
                    existing.status = tx.status;
                }
            }
            None => {
                txs.insert(tx.hash.clone(), tx.clone());
            }
        }
        Ok(())
    }

    async fn find(&self, hash: &str) -> Result<Option<PendingTx>, StoreError> {
        Ok(self.txs.lock().unwrap().get(hash).cloned())
    }

    async fn find_page(&self, query: &TxQuery) -> Result<Page<PendingTx>, StoreError> {
        let txs = self.txs.lock().unwrap();
        let mut rows: Vec<PendingTx> =
            txs.values().filter(|tx| matches(tx, query)).cloned().collect();

        rows.sort_by(|a, b| {
            let ord = match query.order_by {
                OrderBy::Timestamp => a.timestamp.cmp(&b.timestamp),
                OrderBy::Value => cmp_decimal(&a.value, &b.value),
                OrderBy::GasPrice => cmp_decimal(&a.gas_price, &b.gas_price),
                OrderBy::Nonce => a.nonce.cmp(&b.nonce),
            };
            // Hash as a stable tie-break so pagination never straddles.
            let ord = ord.then_with(|| a.hash.cmp(&b.hash));
            match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = rows.len() as u64;
        let offset = query.offset as usize;
        let limit = query.effective_limit() as usize;
        let rows = rows.into_iter().skip(offset).take(limit).collect();
        Ok(Page { rows, total })
    }

    async fn aggregate(&self, chain_id: Option<u64>) -> Result<TxAggregates, StoreError> {
        let txs = self.txs.lock().unwrap();
        let now = Utc::now();
        let hour_ago = now - Duration::hours(1);
        let five_min_ago = now - Duration::minutes(5);

        let mut agg = TxAggregates::default();
        let mut senders: HashMap<String, u64> = HashMap::new();

        for tx in txs.values() {
            if let Some(id) = chain_id {
                if tx.chain_id != id {
                    continue;
                }
            }
            *agg.by_status.entry(tx.status.as_str().to_string()).or_default() += 1;
            *agg.by_chain.entry(tx.chain_id).or_default() += 1;
            if tx.timestamp >= hour_ago {
                *senders.entry(tx.from.clone()).or_default() += 1;
            }
            if tx.timestamp >= five_min_ago {
                agg.count_last_5min += 1;
            }
        }

        let mut top: Vec<SenderCount> = senders
            .into_iter()
            .map(|(address, count)| SenderCount { address, count })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.address.cmp(&b.address)));
        top.truncate(10);
        agg.top_senders_last_hour = top;

        Ok(agg)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut txs = self.txs.lock().unwrap();
        let before = txs.len();
        txs.retain(|_, tx| tx.timestamp >= cutoff);
        Ok((before - txs.len()) as u64)
    }

    async fn upsert_chain(&self, chain: &ChainConfig) -> Result<(), StoreError> {
        self.chains.lock().unwrap().insert(chain.id, chain.clone());
        Ok(())
    }

    async fn chains(&self) -> Result<Vec<ChainConfig>, StoreError> {
        let mut chains: Vec<ChainConfig> = self.chains.lock().unwrap().values().cloned().collect();
        chains.sort_by_key(|c| c.id);
        Ok(chains)
    }
}
