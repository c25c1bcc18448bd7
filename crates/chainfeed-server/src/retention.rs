//! Periodic retention sweep over the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use chainfeed_storage::TxStore;

/// Spawn the sweeper task. Every `every`, rows older than `retention` are
/// deleted. The task exits when `stop` flips (or its sender is dropped).
pub fn spawn_sweeper(
    store: Arc<dyn TxStore>,
    retention: chrono::Duration,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cutoff = Utc::now() - retention;
                    match store.delete_older_than(cutoff).await {
                        Ok(0) => {}
                        Ok(deleted) => info!(deleted, "retention sweep complete"),
                        Err(e) => error!(error = %e, "retention sweep failed"),
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
