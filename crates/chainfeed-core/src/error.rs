//! Error types shared across the ChainFeed pipeline.

use thiserror::Error;

/// Errors produced while normalizing a raw upstream transaction payload.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid hex quantity in '{field}': {value}")]
    InvalidQuantity { field: &'static str, value: String },

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

/// Errors raised while loading or validating configuration.
///
/// All of these are fatal at startup; no session is spawned once one occurs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No chains configured (set CHAIN_1_NAME and CHAIN_1_ID)")]
    NoChains,

    #[error("Invalid value for {var}: {value}")]
    InvalidVar { var: String, value: String },

    #[error("Chain {id}: {reason}")]
    InvalidChain { id: u64, reason: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Missing API key for provider '{provider}' (set {var})")]
    MissingApiKey { provider: String, var: String },

    #[error("No provider in [{tried}] supports chain {chain_id}")]
    UnsupportedChain { chain_id: u64, tried: String },
}

/// Transport-level errors from upstream WebSocket and HTTP JSON-RPC calls.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Fetch misses for transactions that were mined (or dropped) between the
    /// hash notification and the lookup are routine; callers discard them
    /// without logging.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Rpc { message, .. } => message.to_ascii_lowercase().contains("not found"),
            _ => false,
        }
    }
}

/// Errors from the transaction store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate key: {hash}")]
    DuplicateKey { hash: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
