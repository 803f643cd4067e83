//! Broadcast hub: fan-out of outbound messages to connected viewers.
//!
//! # Architecture
//!
//! ```text
//! scheduler / bibliography / progress
//!        │ broadcast(&OutboundMessage)
//!        ▼
//!      Hub ──serialize once──▶ snapshot ──try_send──▶ per-client queue ──▶ session thread
//! ```
//!
//! Each client owns a bounded queue drained by its own session. A slow or
//! dead client only loses its own messages; `broadcast` never blocks and
//! never fails.

mod message;

pub use message::{ClientRequest, OutboundMessage};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Per-client queue depth; older undelivered messages are kept, newer
/// ones dropped once full.
pub const CLIENT_QUEUE_CAPACITY: usize = 64;

pub type ClientId = u64;

/// Serialized message as queued for a client.
pub type Frame = Arc<str>;

/// Receiving end of a registered client.
pub struct ClientHandle {
    pub id: ClientId,
    pub rx: Receiver<Frame>,
}

/// Delivery counts of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Queue full; message skipped for that client.
    pub dropped: usize,
    /// Queue closed; client unregistered.
    pub disconnected: usize,
}

/// Registry of connected clients.
pub struct Hub {
    clients: RwLock<FxHashMap<ClientId, Sender<Frame>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(CLIENT_QUEUE_CAPACITY)
    }
}

impl Hub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            clients: RwLock::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Allocate an id and register a fresh queue for it.
    pub fn connect(&self) -> ClientHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = channel::bounded(self.queue_capacity);
        self.register(id, tx);
        ClientHandle { id, rx }
    }

    /// Register `tx` under `id`, replacing any previous entry.
    pub fn register(&self, id: ClientId, tx: Sender<Frame>) {
        let mut clients = self.clients.write();
        if clients.insert(id, tx).is_some() {
            crate::debug!("hub"; "client {} re-registered", id);
        }
        crate::debug!("hub"; "client {} connected (total: {})", id, clients.len());
    }

    /// Remove a client. Unknown ids are ignored.
    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.write().remove(&id).is_some();
        if removed {
            crate::debug!("hub"; "client {} disconnected", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `msg` to every client registered at call time.
    pub fn broadcast(&self, msg: &OutboundMessage) -> BroadcastReport {
        if self.is_empty() {
            return BroadcastReport::default();
        }
        let frame: Frame = match msg.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                crate::log!("error"; "failed to serialize message: {}", e);
                return BroadcastReport::default();
            }
        };

        let snapshot: Vec<(ClientId, Sender<Frame>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    crate::debug!("hub"; "client {} queue full, message dropped", id);
                    report.dropped += 1;
                }
                Err(TrySendError::Disconnected(_)) => closed.push(id),
            }
        }

        report.disconnected = closed.len();
        for id in closed {
            self.unregister(id);
        }
        report
    }
}

/// Wait for the next frame on a client queue, parsed as JSON.
#[cfg(test)]
pub async fn next_frame(
    rx: &Receiver<Frame>,
    within: std::time::Duration,
) -> Option<serde_json::Value> {
    let poll = async {
        loop {
            if let Ok(frame) = rx.try_recv() {
                return serde_json::from_str(&frame).ok();
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(within, poll).await.ok().flatten()
}
