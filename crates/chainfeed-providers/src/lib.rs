//! chainfeed-providers — URL profiles for major upstream RPC providers.
//!
//! Each provider module knows the URL templates and supported chain ids for
//! one RPC service. [`resolve_endpoint`] walks the configured failover order
//! and returns the first endpoint whose provider supports the chain; a chain
//! with an explicit ws url bypasses the profiles entirely.

pub mod alchemy;
pub mod infura;
pub mod quicknode;

use chainfeed_core::config::ChainSpec;
use chainfeed_core::error::ConfigError;
use chainfeed_core::ChainConfig;

/// A resolved pair of upstream endpoints for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ws_url: String,
    pub http_url: Option<String>,
}

/// A supported provider, parsed from `PROVIDER`/`PROVIDERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Alchemy,
    Infura,
    Quicknode,
    /// Caller-supplied URLs; valid only for chains that declare them.
    Custom,
}

impl Provider {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "alchemy" => Ok(Provider::Alchemy),
            "infura" => Ok(Provider::Infura),
            "quicknode" => Ok(Provider::Quicknode),
            "custom" => Ok(Provider::Custom),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }

    /// Environment variable holding this provider's credential.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Alchemy => "ALCHEMY_API_KEY",
            Provider::Infura => "INFURA_API_KEY",
            Provider::Quicknode => "QUICKNODE_API_KEY",
            Provider::Custom => "",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Alchemy => "alchemy",
            Provider::Infura => "infura",
            Provider::Quicknode => "quicknode",
            Provider::Custom => "custom",
        }
    }

    fn endpoint_for(&self, api_key: &str, chain_id: u64) -> Option<Endpoint> {
        let (ws, http) = match self {
            Provider::Alchemy => (
                alchemy::ws_url(api_key, chain_id),
                alchemy::http_url(api_key, chain_id),
            ),
            Provider::Infura => (
                infura::ws_url(api_key, chain_id),
                infura::http_url(api_key, chain_id),
            ),
            Provider::Quicknode => (
                quicknode::ws_url(api_key, chain_id),
                quicknode::http_url(api_key, chain_id),
            ),
            Provider::Custom => (None, None),
        };
        ws.map(|ws_url| Endpoint { ws_url, http_url: http })
    }
}

/// Resolve concrete endpoints for one declared chain.
///
/// An explicit `ws_url` on the spec short-circuits provider lookup. Otherwise
/// the providers are tried in declared order; a provider that does not cover
/// the chain is skipped, but a configured provider with no credential is a
/// fatal configuration error.
pub fn resolve_endpoint(
    spec: &ChainSpec,
    providers: &[String],
    key_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Endpoint, ConfigError> {
    if let Some(ws_url) = &spec.ws_url {
        return Ok(Endpoint {
            ws_url: ws_url.clone(),
            http_url: spec.rpc_url.clone(),
        });
    }

    if providers.is_empty() {
        return Err(ConfigError::UnsupportedChain {
            chain_id: spec.id,
            tried: String::new(),
        });
    }

    for name in providers {
        let provider = Provider::parse(name)?;
        if provider == Provider::Custom {
            // `custom` covers only chains that declared their own URLs.
            continue;
        }
        let var = provider.api_key_var();
        let api_key = key_lookup(var).ok_or_else(|| ConfigError::MissingApiKey {
            provider: provider.name().to_string(),
            var: var.to_string(),
        })?;
        if let Some(endpoint) = provider.endpoint_for(&api_key, spec.id) {
            return Ok(endpoint);
        }
    }

    Err(ConfigError::UnsupportedChain {
        chain_id: spec.id,
        tried: providers.join(","),
    })
}

/// Resolve every declared chain into a validated [`ChainConfig`].
pub fn resolve_chains(
    specs: &[ChainSpec],
    providers: &[String],
    key_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<ChainConfig>, ConfigError> {
    let mut chains = Vec::with_capacity(specs.len());
    for spec in specs {
        let endpoint = resolve_endpoint(spec, providers, &key_lookup)?;
        let chain = ChainConfig {
            id: spec.id,
            name: spec.name.clone(),
            ws_url: endpoint.ws_url,
            rpc_url: endpoint.http_url,
        };
        chain.validate()?;
        chains.push(chain);
    }
    Ok(chains)
}
