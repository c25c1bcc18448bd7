//! chainfeed-core — canonical types and normalization for ChainFeed.
//!
//! Everything downstream of the upstream sessions (store, hub, query
//! surface) works in terms of the types defined here; chain-specific payload
//! shapes never leave the ingestion layer.

pub mod chain;
pub mod config;
pub mod error;
pub mod normalize;
pub mod tx;

pub use chain::{ChainConfig, ChainStatus, Dialect};
pub use config::{AppConfig, ChainSpec};
pub use error::{ConfigError, NormalizeError, StoreError, TransportError};
pub use normalize::normalize;
pub use tx::{PendingTx, TxStatus};
