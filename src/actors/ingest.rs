//! IngestActor - turns heartbeats into authoritative device state
//!
//! Consumes decoded heartbeats from the inbound adapter. For each one:
//! upsert the device to online with fresh metrics and last-seen, append a
//! metric sample, run alert evaluation synchronously, then broadcast a
//! `device_status` event.
//!
//! Duplicate heartbeats are safe: each is treated as the latest truth and
//! overwrites prior state (last-write-wins, no deduplication). Store errors
//! are logged and never break the loop.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::alerts::AlertEngine;
use crate::hub::{events, Hub};
use crate::store::schema::MetricSample;
use crate::store::DeviceStore;
use crate::HeartbeatPayload;

use super::messages::IngestMessage;

pub struct IngestActor {
    store: Arc<dyn DeviceStore>,
    engine: Arc<AlertEngine>,
    hub: Arc<Hub>,
    rx: mpsc::Receiver<IngestMessage>,
}

impl IngestActor {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        engine: Arc<AlertEngine>,
        hub: Arc<Hub>,
        rx: mpsc::Receiver<IngestMessage>,
    ) -> Self {
        Self {
            store,
            engine,
            hub,
            rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting ingest actor");

        while let Some(message) = self.rx.recv().await {
            match message {
                IngestMessage::Heartbeat(payload) => self.handle_heartbeat(payload).await,
                IngestMessage::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("ingest actor stopped");
    }

    #[instrument(skip(self, payload), fields(mac = %payload.mac))]
    async fn handle_heartbeat(&self, payload: HeartbeatPayload) {
        let now = Utc::now();

        let device = match self.store.upsert_heartbeat(&payload, now).await {
            Ok(device) => device,
            Err(e) => {
                warn!("failed to upsert device from heartbeat: {e}");
                return;
            }
        };

        if let Err(e) = self
            .store
            .insert_sample(MetricSample::from_heartbeat(device.id, &payload, now))
            .await
        {
            warn!("failed to append metric sample: {e}");
        }

        self.engine.evaluate_heartbeat(&device, &payload).await;

        self.hub
            .broadcast(
                events::DEVICE_STATUS,
                json!({
                    "mac": payload.mac,
                    "device_id": device.id,
                    "cpu_usage": payload.cpu_usage,
                    "mem_usage": payload.mem_usage,
                    "rx_bytes": payload.rx_bytes,
                    "tx_bytes": payload.tx_bytes,
                    "conntrack": payload.conntrack,
                    "uptime_secs": payload.uptime_secs,
                    "load_avg": payload.load_avg,
                    "status": device.status,
                }),
            )
            .await;
    }
}

/// Handle for feeding the IngestActor
#[derive(Clone)]
pub struct IngestHandle {
    sender: mpsc::Sender<IngestMessage>,
}

impl IngestHandle {
    pub fn spawn(store: Arc<dyn DeviceStore>, engine: Arc<AlertEngine>, hub: Arc<Hub>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let actor = IngestActor::new(store, engine, hub, rx);
        tokio::spawn(actor.run());
        Self { sender: tx }
    }

    /// Feed one decoded heartbeat into the pipeline.
    pub async fn ingest(&self, payload: HeartbeatPayload) {
        if self.sender.send(IngestMessage::Heartbeat(payload)).await.is_err() {
            warn!("ingest actor is gone, dropping heartbeat");
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(IngestMessage::Shutdown).await;
    }
}
