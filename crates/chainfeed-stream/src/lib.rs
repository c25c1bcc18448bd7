//! chainfeed-stream — upstream ingestion sessions.
//!
//! One [`UpstreamSession`] per configured chain: it owns the WebSocket to
//! the provider, speaks the chain's subscription dialect, completes partial
//! notifications over HTTP when the dialect requires it, and emits
//! normalized transactions plus connectivity transitions on its event
//! channel. Reconnection is internal to the session task.

pub mod dialect;
pub mod fetch;
pub mod jsonrpc;
pub mod session;

pub use dialect::{Decoded, DialectWire};
pub use fetch::RpcFetcher;
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, SUBSCRIBE_REQUEST_ID};
pub use session::{SessionConfig, SessionEvent, SessionHandle, SessionState, UpstreamSession};
