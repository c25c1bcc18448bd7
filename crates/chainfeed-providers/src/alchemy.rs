//! Alchemy provider profile.
//!
//! URL templates per <https://docs.alchemy.com/reference/api-overview>.
//! Alchemy serves the enhanced `alchemy_pendingTransactions` /
//! `alchemy_minedTransactions` subscriptions used by the full-object
//! dialects.

/// WebSocket endpoint for a supported chain, `None` otherwise.
pub fn ws_url(api_key: &str, chain_id: u64) -> Option<String> {
    network(chain_id).map(|net| format!("wss://{net}.g.alchemy.com/v2/{api_key}"))
}

/// HTTP JSON-RPC endpoint for a supported chain, `None` otherwise.
pub fn http_url(api_key: &str, chain_id: u64) -> Option<String> {
    network(chain_id).map(|net| format!("https://{net}.g.alchemy.com/v2/{api_key}"))
}

fn network(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("eth-mainnet"),
        11155111 => Some("eth-sepolia"),
        137 => Some("polygon-mainnet"),
        80002 => Some("polygon-amoy"),
        42161 => Some("arb-mainnet"),
        421614 => Some("arb-sepolia"),
        10 => Some("opt-mainnet"),
        11155420 => Some("opt-sepolia"),
        8453 => Some("base-mainnet"),
        84532 => Some("base-sepolia"),
        _ => None,
    }
}
