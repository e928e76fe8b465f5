//! RetentionActor - deletes metric samples past the retention window
//!
//! Daily sweep; the retention period is read fresh each run from settings
//! (`metrics_retention_days`, default 30).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::store::schema::settings;
use crate::store::DeviceStore;

use super::messages::RetentionCommand;

const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_RETENTION_DAYS: i64 = 30;

pub struct RetentionActor {
    store: Arc<dyn DeviceStore>,
    command_rx: mpsc::Receiver<RetentionCommand>,
}

impl RetentionActor {
    pub fn new(store: Arc<dyn DeviceStore>, command_rx: mpsc::Receiver<RetentionCommand>) -> Self {
        Self { store, command_rx }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting retention sweeper (interval: 24h)");

        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(RetentionCommand::SweepNow { respond_to }) => {
                            let deleted = self.sweep().await;
                            let _ = respond_to.send(deleted);
                        }
                        Some(RetentionCommand::Shutdown) | None => {
                            debug!("retention sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn sweep(&self) -> usize {
        let days = match self
            .store
            .get_setting(settings::METRICS_RETENTION_DAYS)
            .await
        {
            Ok(Some(raw)) => raw
                .parse::<i64>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            Ok(None) => DEFAULT_RETENTION_DAYS,
            Err(e) => {
                warn!("failed to read retention setting: {e}");
                DEFAULT_RETENTION_DAYS
            }
        };

        let cutoff = Utc::now() - chrono::Duration::days(days);
        match self.store.delete_samples_before(cutoff).await {
            Ok(0) => 0,
            Ok(deleted) => {
                info!("cleaned up {deleted} old metric samples (retention: {days} days)");
                deleted
            }
            Err(e) => {
                warn!("retention sweep failed: {e}");
                0
            }
        }
    }
}

/// Handle for controlling the RetentionActor
#[derive(Clone)]
pub struct RetentionHandle {
    sender: mpsc::Sender<RetentionCommand>,
}

impl RetentionHandle {
    pub fn spawn(store: Arc<dyn DeviceStore>) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let actor = RetentionActor::new(store, rx);
        tokio::spawn(actor.run());
        Self { sender: tx }
    }

    pub async fn sweep_now(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(RetentionCommand::SweepNow { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(RetentionCommand::Shutdown).await;
    }
}
