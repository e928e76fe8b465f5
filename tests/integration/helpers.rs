//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetgate::HeartbeatPayload;
use fleetgate::actors::dispatch::CommandTransport;
use fleetgate::alerts::AlertEngine;
use fleetgate::hub::{Hub, HubConnection};
use fleetgate::notify::LogNotifier;
use fleetgate::store::{DeviceStore, MemoryStore};
use tokio::sync::Mutex;

pub fn heartbeat(mac: &str, cpu_usage: f64, mem_usage: f64) -> HeartbeatPayload {
    HeartbeatPayload {
        mac: mac.to_string(),
        cpu_usage,
        mem_usage,
        mem_total: 512_000_000,
        mem_free: 256_000_000,
        rx_bytes: 1_000,
        tx_bytes: 2_000,
        conntrack: 120,
        uptime_secs: 3_600,
        load_avg: "0.50 0.40 0.30".to_string(),
    }
}

/// Store + hub + alert engine wired the way the server binary wires them,
/// minus the network edges.
pub fn test_system() -> (Arc<dyn DeviceStore>, Arc<Hub>, Arc<AlertEngine>) {
    let store: Arc<dyn DeviceStore> = Arc::new(MemoryStore::new());
    let hub = Arc::new(Hub::new());
    let engine = Arc::new(AlertEngine::new(
        store.clone(),
        hub.clone(),
        Arc::new(LogNotifier),
    ));
    (store, hub, engine)
}

/// Receive the next broadcast frame, parsed, with a test-friendly timeout.
pub async fn next_frame(conn: &mut HubConnection) -> serde_json::Value {
    let frame = tokio::time::timeout(Duration::from_secs(1), conn.rx.recv())
        .await
        .expect("timed out waiting for a broadcast frame")
        .expect("hub connection closed");
    serde_json::from_str(&frame).expect("broadcast frame is valid JSON")
}

/// Transport that records every publish instead of touching a broker.
#[derive(Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl CommandTransport for RecordingTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        let value = serde_json::from_slice(&payload)?;
        self.published
            .lock()
            .await
            .push((topic.to_string(), value));
        Ok(())
    }
}

/// Transport whose every publish fails, for exercising the error path.
pub struct FailingTransport;

#[async_trait]
impl CommandTransport for FailingTransport {
    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> anyhow::Result<()> {
        anyhow::bail!("broker unavailable")
    }
}
