//! The supervisor: session lifecycle and event wiring.
//!
//! One session task plus one consumer task per chain. The consumer drains
//! the session's event channel in order, so per-chain delivery order to the
//! store and hub matches the upstream decode order. A single stop signal
//! fans out to every session; shutdown waits for the tasks so that no
//! socket stays open and no reconnect timer survives.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use chainfeed_core::error::{ConfigError, StoreError};
use chainfeed_core::{ChainConfig, ChainStatus};
use chainfeed_server::SubscriberHub;
use chainfeed_storage::TxStore;
use chainfeed_stream::{SessionConfig, SessionEvent, SessionHandle, UpstreamSession};

/// Depth of each session's event channel. Bounded so a wedged store applies
/// backpressure to the session instead of buffering without limit.
const EVENT_QUEUE: usize = 1_024;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("chain table reconciliation failed: {0}")]
    Store(#[from] StoreError),
}

pub struct Supervisor {
    stop_tx: watch::Sender<bool>,
    sessions: Vec<SessionHandle>,
    consumers: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Validate the chain list, reconcile the store's chain table, and spawn
    /// one session per chain. Validation failures happen before anything is
    /// spawned.
    pub async fn start(
        chains: Vec<ChainConfig>,
        store: Arc<dyn TxStore>,
        hub: Arc<SubscriberHub>,
    ) -> Result<Self, SupervisorError> {
        if chains.is_empty() {
            return Err(ConfigError::NoChains.into());
        }
        for chain in &chains {
            chain.validate()?;
        }
        for chain in &chains {
            store.upsert_chain(chain).await?;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut sessions = Vec::with_capacity(chains.len());
        let mut consumers = Vec::with_capacity(chains.len());

        for chain in chains {
            let chain_id = chain.id;
            let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
            let session =
                UpstreamSession::spawn(SessionConfig::new(chain), events_tx, stop_rx.clone());
            let consumer = tokio::spawn(consume_events(
                chain_id,
                events_rx,
                store.clone(),
                hub.clone(),
            ));
            sessions.push(session);
            consumers.push(consumer);
        }

        info!(chains = sessions.len(), "supervisor started");
        Ok(Self {
            stop_tx,
            sessions,
            consumers,
        })
    }

    pub fn chain_count(&self) -> usize {
        self.sessions.len()
    }

    /// Stop every session (cancelling active sockets and pending reconnect
    /// waits) and wait for the tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);

        for session in self.sessions {
            let chain = session.chain_id;
            if tokio::time::timeout(SHUTDOWN_GRACE, session.task).await.is_err() {
                warn!(chain, "session did not stop within grace period");
            }
        }
        // Consumers end once their session drops the event sender.
        for consumer in self.consumers {
            if tokio::time::timeout(SHUTDOWN_GRACE, consumer).await.is_err() {
                warn!("event consumer did not stop within grace period");
            }
        }
        info!("supervisor stopped");
    }
}

/// Forward one session's events: transactions go to the store and then to
/// the hub (broadcast proceeds even when the store fails); connectivity
/// transitions go to the hub as chain-status pushes.
async fn consume_events(
    chain_id: u64,
    mut events: mpsc::Receiver<SessionEvent>,
    store: Arc<dyn TxStore>,
    hub: Arc<SubscriberHub>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Transaction(tx) => {
                if let Err(e) = store.upsert(&tx).await {
                    // Duplicate-key races are expected and absorbed.
                    if !e.is_duplicate() {
                        error!(chain = chain_id, tx = %tx.hash, error = %e, "store upsert failed");
                    }
                }
                hub.broadcast_transaction(&tx);
            }
            SessionEvent::Connected => {
                hub.broadcast_chain_status(chain_id, ChainStatus::Connected);
            }
            SessionEvent::Disconnected => {
                hub.broadcast_chain_status(chain_id, ChainStatus::Disconnected);
            }
        }
    }
}
