//! chainfeed-server — the downstream half of the pipeline.
//!
//! The [`SubscriberHub`] fans normalized transactions and chain-status
//! transitions out to WebSocket subscribers; the HTTP surface answers
//! bounded historical queries and aggregates over the store; the retention
//! sweeper keeps the window from growing without bound.

pub mod api;
pub mod hub;
pub mod protocol;
pub mod retention;
pub mod ws;

pub use api::{router, AppState};
pub use hub::{SubscriberHub, SUBSCRIBER_QUEUE};
pub use protocol::{ClientMessage, ServerMessage};
pub use retention::spawn_sweeper;
