//! LivenessActor - demotes silent devices to offline
//!
//! One fixed-interval sweep handles the whole fleet: each tick reads the
//! offline threshold fresh from settings, computes a cutoff, batch-moves
//! every online device whose last heartbeat precedes it to offline and
//! emits one `device_status` event per transitioned device. No per-device
//! timers; worst-case detection latency is one tick.
//!
//! The online transition lives in the ingestor, not here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::hub::{events, Hub};
use crate::store::schema::settings;
use crate::store::DeviceStore;

use super::messages::LivenessCommand;

/// Sweep interval
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Offline threshold used when the setting is absent or unparseable
const DEFAULT_OFFLINE_THRESHOLD_SECS: i64 = 120;

pub struct LivenessActor {
    store: Arc<dyn DeviceStore>,
    hub: Arc<Hub>,
    command_rx: mpsc::Receiver<LivenessCommand>,
}

impl LivenessActor {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        hub: Arc<Hub>,
        command_rx: mpsc::Receiver<LivenessCommand>,
    ) -> Self {
        Self {
            store,
            hub,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting liveness monitor (interval: {SWEEP_INTERVAL:?})");

        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(LivenessCommand::TickNow { respond_to }) => {
                            let transitioned = self.sweep().await;
                            let _ = respond_to.send(transitioned);
                        }
                        Some(LivenessCommand::Shutdown) | None => {
                            debug!("liveness monitor shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// One sweep: returns how many devices were transitioned to offline.
    async fn sweep(&self) -> usize {
        let threshold = self.offline_threshold_secs().await;
        let cutoff = Utc::now() - chrono::Duration::seconds(threshold);

        let stale = match self.store.mark_stale_offline(cutoff).await {
            Ok(stale) => stale,
            Err(e) => {
                warn!("offline sweep failed: {e}");
                return 0;
            }
        };

        if stale.is_empty() {
            return 0;
        }

        info!(
            "marked {} device(s) as offline (threshold: {threshold}s)",
            stale.len()
        );

        for device in &stale {
            self.hub
                .broadcast(
                    events::DEVICE_STATUS,
                    json!({
                        "mac": device.mac,
                        "device_id": device.id,
                        "status": "offline",
                    }),
                )
                .await;
        }

        stale.len()
    }

    /// Threshold is re-read every tick so setting changes apply without
    /// restart.
    async fn offline_threshold_secs(&self) -> i64 {
        match self.store.get_setting(settings::OFFLINE_THRESHOLD).await {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(v) if v > 0 => v,
                _ => DEFAULT_OFFLINE_THRESHOLD_SECS,
            },
            Ok(None) => DEFAULT_OFFLINE_THRESHOLD_SECS,
            Err(e) => {
                warn!("failed to read offline threshold: {e}");
                DEFAULT_OFFLINE_THRESHOLD_SECS
            }
        }
    }
}

/// Handle for controlling the LivenessActor
#[derive(Clone)]
pub struct LivenessHandle {
    sender: mpsc::Sender<LivenessCommand>,
}

impl LivenessHandle {
    pub fn spawn(store: Arc<dyn DeviceStore>, hub: Arc<Hub>) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let actor = LivenessActor::new(store, hub, rx);
        tokio::spawn(actor.run());
        Self { sender: tx }
    }

    /// Run one sweep immediately; returns the number of devices demoted.
    pub async fn tick_now(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(LivenessCommand::TickNow { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(LivenessCommand::Shutdown).await;
    }
}
