//! Environment-driven configuration.
//!
//! Chains are declared as numbered variable groups (`CHAIN_1_NAME`,
//! `CHAIN_1_ID`, ...); loading walks the index upward and stops at the first
//! missing name/id pair. Endpoint resolution for chains without an explicit
//! `CHAIN_{i}_WS_URL` is handled later by the provider profiles.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_RETENTION_HOURS: u64 = 24;

/// One chain as declared in the environment, before provider resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub id: u64,
    pub name: String,
    /// Explicit WebSocket endpoint; takes precedence over provider profiles.
    pub ws_url: Option<String>,
    /// Explicit HTTP endpoint.
    pub rpc_url: Option<String>,
}

/// Fully loaded process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub retention_hours: u64,
    /// Provider names in failover order; used only for chains without an
    /// explicit ws url.
    pub providers: Vec<String>,
    pub chains: Vec<ChainSpec>,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (the seam the tests use).
    pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidVar {
                var: "PORT".into(),
                value: raw.clone(),
            })?,
            None => DEFAULT_PORT,
        };

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:chainfeed.db?mode=rwc".to_string());

        let retention_hours = match lookup("RETENTION_HOURS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidVar {
                var: "RETENTION_HOURS".into(),
                value: raw.clone(),
            })?,
            None => DEFAULT_RETENTION_HOURS,
        };

        // PROVIDERS (comma-separated failover order) wins over PROVIDER.
        let providers = lookup("PROVIDERS")
            .or_else(|| lookup("PROVIDER"))
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut chains = Vec::new();
        for i in 1.. {
            let name = lookup(&format!("CHAIN_{i}_NAME"));
            let id = lookup(&format!("CHAIN_{i}_ID"));
            let (name, id_raw) = match (name, id) {
                (Some(n), Some(v)) => (n, v),
                // Loading stops at the first incomplete group.
                _ => break,
            };
            let id = id_raw.parse::<u64>().map_err(|_| ConfigError::InvalidVar {
                var: format!("CHAIN_{i}_ID"),
                value: id_raw.clone(),
            })?;
            chains.push(ChainSpec {
                id,
                name,
                ws_url: lookup(&format!("CHAIN_{i}_WS_URL")),
                rpc_url: lookup(&format!("CHAIN_{i}_RPC_URL")),
            });
        }

        if chains.is_empty() {
            return Err(ConfigError::NoChains);
        }

        Ok(AppConfig {
            port,
            database_url,
            retention_hours,
            providers,
            chains,
        })
    }
}
