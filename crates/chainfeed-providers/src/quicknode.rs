//! QuickNode provider profile.
//!
//! QuickNode uses personal subdomain URLs rather than a shared key template,
//! so the credential is the `endpoint-name/token` pair from the dashboard.

/// WebSocket endpoint for a supported chain, `None` otherwise.
pub fn ws_url(credential: &str, chain_id: u64) -> Option<String> {
    let (name, token) = split_credential(credential)?;
    network(chain_id).map(|net| match net {
        // Ethereum mainnet endpoints carry no network segment.
        "" => format!("wss://{name}.quiknode.pro/{token}/"),
        net => format!("wss://{name}.{net}.quiknode.pro/{token}/"),
    })
}

/// HTTP JSON-RPC endpoint for a supported chain, `None` otherwise.
pub fn http_url(credential: &str, chain_id: u64) -> Option<String> {
    ws_url(credential, chain_id).map(|ws| ws.replacen("wss://", "https://", 1))
}

fn split_credential(credential: &str) -> Option<(&str, &str)> {
    let (name, token) = credential.split_once('/')?;
    if name.is_empty() || token.is_empty() {
        return None;
    }
    Some((name, token))
}

fn network(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some(""),
        137 => Some("matic"),
        42161 => Some("arbitrum-mainnet"),
        10 => Some("optimism"),
        8453 => Some("base-mainnet"),
        56 => Some("bsc"),
        43114 => Some("avalanche-mainnet"),
        _ => None,
    }
}
