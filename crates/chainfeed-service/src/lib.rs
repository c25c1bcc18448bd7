//! chainfeed-service — process assembly.
//!
//! The [`Supervisor`] owns the per-chain sessions and the wiring between
//! them, the store, and the subscriber hub.

pub mod supervisor;

pub use supervisor::{Supervisor, SupervisorError};
