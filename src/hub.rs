//! Broadcast hub for real-time observers
//!
//! Maintains the set of live dashboard connections and fans typed events out
//! to all of them. Each connection owns a bounded queue; `broadcast`
//! serializes the frame once, snapshots the current senders, and then pushes
//! into each queue with a bounded wait. A connection whose queue stays full
//! past the timeout is dropped, so one stalled observer can delay a broadcast
//! by at most [`SEND_TIMEOUT`] and never blocks delivery to the others
//! indefinitely.
//!
//! Socket I/O and keepalive pings live in the WebSocket handler
//! (`api::websocket`), never under the hub's lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

/// Frames buffered per connection before the observer counts as stalled
const CONNECTION_QUEUE_SIZE: usize = 64;

/// Bounded wait per connection when its queue is full
const SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Well-known event types carried on the observer channel
pub mod events {
    pub const DEVICE_STATUS: &str = "device_status";
    pub const ALERT: &str = "alert";
    pub const CONFIG_ACK: &str = "config_ack";
    pub const UPGRADE_ACK: &str = "upgrade_ack";
}

/// Ownership-exclusive handle to one observer connection
///
/// Dropping the connection (or calling [`Hub::unsubscribe`]) removes it from
/// the fan-out set.
pub struct HubConnection {
    pub id: u64,
    pub rx: mpsc::Receiver<String>,
}

pub struct Hub {
    clients: RwLock<HashMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new observer and hand back its connection handle.
    pub async fn subscribe(&self) -> HubConnection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CONNECTION_QUEUE_SIZE);

        self.clients.write().await.insert(id, tx);
        debug!("observer {id} subscribed");

        HubConnection { id, rx }
    }

    /// Remove an observer. Safe to call for already-removed ids.
    pub async fn unsubscribe(&self, id: u64) {
        if self.clients.write().await.remove(&id).is_some() {
            debug!("observer {id} unsubscribed");
        }
    }

    /// Serialize `{type, data, timestamp}` once and deliver it to every
    /// currently subscribed observer.
    ///
    /// Delivery into each queue waits at most [`SEND_TIMEOUT`]; observers
    /// that fail or time out are dropped after the delivery pass.
    pub async fn broadcast(&self, event_type: &str, data: serde_json::Value) {
        let frame = serde_json::json!({
            "type": event_type,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        })
        .to_string();

        // Snapshot senders so no lock is held while waiting on slow queues.
        let snapshot: Vec<(u64, mpsc::Sender<String>)> = {
            let clients = self.clients.read().await;
            clients.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut stalled = Vec::new();
        for (id, tx) in snapshot {
            if tx.send_timeout(frame.clone(), SEND_TIMEOUT).await.is_err() {
                warn!("observer {id} not accepting events, dropping");
                stalled.push(id);
            }
        }

        if !stalled.is_empty() {
            let mut clients = self.clients.write().await;
            for id in stalled {
                clients.remove(&id);
            }
        }
    }

    /// Point-in-time observer count; observability only, never used for
    /// control decisions.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
