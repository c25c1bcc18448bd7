//! The subscriber hub — fan-out of transactions and chain-status events.
//!
//! Each subscriber owns a bounded queue drained by its connection task.
//! Broadcast snapshots the matching senders under a short lock and then
//! pushes without blocking: a full queue drops that subscriber's copy of the
//! message, a closed queue evicts the subscriber. A stalled downstream can
//! therefore never hold up a session or another subscriber.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use chainfeed_core::{ChainStatus, PendingTx};

use crate::protocol::ServerMessage;

/// Per-subscriber queue depth. Chain-status events and acks share the queue
/// with transaction pushes.
pub const SUBSCRIBER_QUEUE: usize = 256;

struct Subscriber {
    /// `None` means "all chains".
    filter: Option<HashSet<u64>>,
    sender: mpsc::Sender<ServerMessage>,
}

impl Subscriber {
    fn wants(&self, chain_id: u64) -> bool {
        match &self.filter {
            None => true,
            Some(set) => set.contains(&chain_id),
        }
    }
}

#[derive(Default)]
pub struct SubscriberHub {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    /// Last observed connectivity per chain, for the health endpoint.
    chain_status: Mutex<HashMap<u64, ChainStatus>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber with no filter (all chains). Returns its id and the
    /// receive half its connection task must drain.
    pub fn register(&self) -> (u64, mpsc::Receiver<ServerMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.subscribers
            .lock()
            .unwrap()
            .insert(id, Subscriber { filter: None, sender: tx });
        debug!(subscriber = id, "subscriber registered");
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        if self.subscribers.lock().unwrap().remove(&id).is_some() {
            debug!(subscriber = id, "subscriber removed");
        }
    }

    /// Replace the subscriber's chain filter (`None` = all chains).
    pub fn set_filter(&self, id: u64, filter: Option<HashSet<u64>>) {
        if let Some(sub) = self.subscribers.lock().unwrap().get_mut(&id) {
            sub.filter = filter;
        }
    }

    /// Queue a direct message (acks, pongs) for one subscriber.
    pub fn send_to(&self, id: u64, msg: ServerMessage) {
        let sender = {
            let subs = self.subscribers.lock().unwrap();
            match subs.get(&id) {
                Some(sub) => sub.sender.clone(),
                None => return,
            }
        };
        let _ = sender.try_send(msg);
    }

    /// Push one transaction to every subscriber whose filter matches.
    /// Callable from any session task concurrently.
    pub fn broadcast_transaction(&self, tx: &PendingTx) {
        self.broadcast(tx.chain_id, || ServerMessage::Transaction { data: tx.clone() });
    }

    /// Push a chain-level connectivity transition to interested subscribers
    /// and remember it for the health snapshot.
    pub fn broadcast_chain_status(&self, chain_id: u64, status: ChainStatus) {
        self.chain_status.lock().unwrap().insert(chain_id, status);
        self.broadcast(chain_id, || ServerMessage::ChainStatus { chain_id, status });
    }

    fn broadcast(&self, chain_id: u64, make: impl Fn() -> ServerMessage) {
        // Snapshot matching senders under the lock, send outside it.
        let targets: Vec<(u64, mpsc::Sender<ServerMessage>)> = {
            let subs = self.subscribers.lock().unwrap();
            subs.iter()
                .filter(|(_, sub)| sub.wants(chain_id))
                .map(|(id, sub)| (*id, sub.sender.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, sender) in targets {
            match sender.try_send(make()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow consumer: drop this message for this subscriber
                    // only; the connection stays up.
                    trace!(subscriber = id, "queue full, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut subs = self.subscribers.lock().unwrap();
            for id in dead {
                subs.remove(&id);
                debug!(subscriber = id, "subscriber gone, removed during broadcast");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub fn chain_statuses(&self) -> HashMap<u64, ChainStatus> {
        self.chain_status.lock().unwrap().clone()
    }
}
