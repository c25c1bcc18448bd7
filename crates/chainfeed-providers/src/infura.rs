//! Infura provider profile.

/// WebSocket endpoint for a supported chain, `None` otherwise.
pub fn ws_url(project_id: &str, chain_id: u64) -> Option<String> {
    network(chain_id).map(|net| format!("wss://{net}.infura.io/ws/v3/{project_id}"))
}

/// HTTP JSON-RPC endpoint for a supported chain, `None` otherwise.
pub fn http_url(project_id: &str, chain_id: u64) -> Option<String> {
    network(chain_id).map(|net| format!("https://{net}.infura.io/v3/{project_id}"))
}

fn network(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("mainnet"),
        11155111 => Some("sepolia"),
        137 => Some("polygon-mainnet"),
        42161 => Some("arbitrum-mainnet"),
        10 => Some("optimism-mainnet"),
        8453 => Some("base-mainnet"),
        43114 => Some("avalanche-mainnet"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_urls() {
        assert_eq!(
            ws_url("proj123", 1).unwrap(),
            "wss://mainnet.infura.io/ws/v3/proj123"
        );
        assert_eq!(
            http_url("proj123", 1).unwrap(),
            "https://mainnet.infura.io/v3/proj123"
        );
    }

    #[test]
    fn unsupported_chain_is_none() {
        assert!(ws_url("proj123", 56).is_none());
    }
}
