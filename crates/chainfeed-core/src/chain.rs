//! Chain descriptors and the upstream subscription dialect registry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// One configured chain, immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// EVM chain id, positive.
    pub id: u64,
    /// Human-readable name, e.g. "ethereum".
    pub name: String,
    /// Upstream WebSocket endpoint. Must be `wss://`.
    pub ws_url: String,
    /// Explicit HTTP JSON-RPC endpoint. When absent it is derived from
    /// `ws_url` by swapping the scheme to `https://`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl ChainConfig {
    /// The HTTP endpoint used by fetch-based dialects.
    pub fn http_url(&self) -> String {
        match &self.rpc_url {
            Some(url) => url.clone(),
            None => derive_http_url(&self.ws_url),
        }
    }

    /// Startup validation; any failure here is fatal before sessions spawn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id == 0 {
            return Err(ConfigError::InvalidChain {
                id: self.id,
                reason: "chain id must be a positive integer".into(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidChain {
                id: self.id,
                reason: "chain name must be non-empty".into(),
            });
        }
        if !self.ws_url.starts_with("wss://") {
            return Err(ConfigError::InvalidChain {
                id: self.id,
                reason: format!("ws url must start with wss:// (got '{}')", self.ws_url),
            });
        }
        Ok(())
    }
}

fn derive_http_url(ws_url: &str) -> String {
    if let Some(rest) = ws_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = ws_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        ws_url.to_string()
    }
}

/// How a chain's upstream streams transactions.
///
/// The dialect fixes both the `eth_subscribe` params and the payload shape
/// the session expects in notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `alchemy_pendingTransactions` with full transaction objects.
    FullPending,
    /// `alchemy_minedTransactions`; payload is `{removed, transaction}`.
    FullMined,
    /// Standard `newPendingTransactions`; payload is a bare hash, the full
    /// transaction is fetched over HTTP.
    HashOnlyPending,
    /// `newHeads`; each header triggers an `eth_getBlockByNumber` fetch and
    /// every transaction in the block is emitted as confirmed.
    HeadersThenFetch,
}

impl Dialect {
    /// Default dialect for well-known chain ids.
    ///
    /// Chains with a public mempool behind an enhanced-API provider stream
    /// full pending objects; L2s with sequencer-private mempools fall back to
    /// header-driven fetching; chains served by plain geth-style providers
    /// use the standard hash subscription. Anything unknown is treated like
    /// an L2.
    pub fn for_chain(chain_id: u64) -> Self {
        match chain_id {
            // Ethereum mainnet + Sepolia
            1 | 11155111 => Dialect::FullPending,
            // Polygon PoS
            137 => Dialect::FullMined,
            // BNB Smart Chain, Avalanche C-Chain
            56 | 43114 => Dialect::HashOnlyPending,
            // Base, Arbitrum One, OP Mainnet
            8453 | 42161 | 10 => Dialect::HeadersThenFetch,
            _ => Dialect::HeadersThenFetch,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dialect::FullPending => "full_pending",
            Dialect::FullMined => "full_mined",
            Dialect::HashOnlyPending => "hash_only_pending",
            Dialect::HeadersThenFetch => "headers_then_fetch",
        };
        f.write_str(s)
    }
}

/// Chain-level connectivity as seen by downstream subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    Connected,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(id: u64, name: &str, ws: &str) -> ChainConfig {
        ChainConfig {
            id,
            name: name.into(),
            ws_url: ws.into(),
            rpc_url: None,
        }
    }

    #[test]
    fn http_url_derived_from_ws() {
        let c = cfg(1, "ethereum", "wss://eth-mainnet.g.alchemy.com/v2/key");
        assert_eq!(c.http_url(), "https://eth-mainnet.g.alchemy.com/v2/key");
    }

    #[test]
    fn explicit_rpc_url_wins() {
        let mut c = cfg(1, "ethereum", "wss://a.example/ws");
        c.rpc_url = Some("https://b.example/rpc".into());
        assert_eq!(c.http_url(), "https://b.example/rpc");
    }

    #[test]
    fn validate_rejects_bad_configs() {
        assert!(cfg(0, "x", "wss://a").validate().is_err());
        assert!(cfg(1, "", "wss://a").validate().is_err());
        assert!(cfg(1, "x", "ws://insecure").validate().is_err());
        assert!(cfg(1, "x", "https://nope").validate().is_err());
        assert!(cfg(1, "ethereum", "wss://a.example").validate().is_ok());
    }

    #[test]
    fn dialect_registry_defaults() {
        assert_eq!(Dialect::for_chain(1), Dialect::FullPending);
        assert_eq!(Dialect::for_chain(137), Dialect::FullMined);
        assert_eq!(Dialect::for_chain(56), Dialect::HashOnlyPending);
        assert_eq!(Dialect::for_chain(8453), Dialect::HeadersThenFetch);
        // Unknown chains behave like header-driven L2s.
        assert_eq!(Dialect::for_chain(999_999), Dialect::HeadersThenFetch);
    }
}
