//! DispatchActor - correlated command dispatch and ack bookkeeping
//!
//! Owns the lifecycle of every command sent to a device: record it as
//! pending, publish it on the message channel with a bounded wait, and
//! transition it to a terminal state when (if ever) the matching ack
//! arrives. A command whose ack never arrives stays pending forever; there
//! is no timeout and no automatic retry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::hub::{events, Hub};
use crate::store::schema::{CommandKind, CommandStatus, DispatchedCommand};
use crate::store::DeviceStore;
use crate::{CommandEnvelope, ConfigEnvelope};

use super::messages::{BatchOutcome, DispatchCommand, DispatchRequest, UpgradeSpec};

/// Transport seam for publishing commands to devices
///
/// The MQTT publisher implements this in production; tests substitute
/// recording or failing mocks. Implementations bound the wait for publish
/// confirmation themselves.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()>;
}

pub struct DispatchActor {
    store: Arc<dyn DeviceStore>,
    hub: Arc<Hub>,
    transport: Arc<dyn CommandTransport>,
    topic_prefix: String,
    command_rx: mpsc::Receiver<DispatchCommand>,
}

impl DispatchActor {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        hub: Arc<Hub>,
        transport: Arc<dyn CommandTransport>,
        topic_prefix: String,
        command_rx: mpsc::Receiver<DispatchCommand>,
    ) -> Self {
        Self {
            store,
            hub,
            transport,
            topic_prefix,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting command dispatcher");

        while let Some(command) = self.command_rx.recv().await {
            match command {
                DispatchCommand::Dispatch {
                    mac,
                    request,
                    respond_to,
                } => {
                    let result = self.dispatch_one(&mac, request).await;
                    let _ = respond_to.send(result);
                }

                DispatchCommand::Acknowledge {
                    correlation_id,
                    status,
                    error,
                } => {
                    self.acknowledge(correlation_id, status, error).await;
                }

                DispatchCommand::BatchUpgrade {
                    spec,
                    group,
                    model,
                    respond_to,
                } => {
                    let outcome = self
                        .batch_upgrade(spec, group.as_deref(), model.as_deref())
                        .await;
                    let _ = respond_to.send(outcome);
                }

                DispatchCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("command dispatcher stopped");
    }

    /// Record a pending command and publish it.
    ///
    /// A publish failure is reported to the caller; the record stays
    /// pending in the store and it is the caller's decision whether to
    /// issue a new dispatch.
    #[instrument(skip(self, request), fields(mac = %mac))]
    async fn dispatch_one(&self, mac: &str, request: DispatchRequest) -> anyhow::Result<Uuid> {
        let device = self
            .store
            .get_device(mac)
            .await?
            .ok_or_else(|| anyhow::anyhow!("device {mac} not found"))?;

        let correlation_id = Uuid::new_v4();

        let (kind, topic, wire_payload, record_payload) = match request {
            DispatchRequest::ConfigPush { content } => {
                let envelope = ConfigEnvelope {
                    config_id: correlation_id,
                    content,
                };
                (
                    CommandKind::ConfigPush,
                    format!("{}/devices/{mac}/config", self.topic_prefix),
                    serde_json::to_vec(&envelope)?,
                    serde_json::to_value(&envelope)?,
                )
            }
            DispatchRequest::Upgrade(UpgradeSpec {
                version,
                url,
                sha256,
            }) => {
                let envelope = CommandEnvelope::Upgrade {
                    upgrade_id: correlation_id,
                    version,
                    url,
                    sha256,
                };
                (
                    CommandKind::Upgrade,
                    format!("{}/devices/{mac}/command", self.topic_prefix),
                    serde_json::to_vec(&envelope)?,
                    serde_json::to_value(&envelope)?,
                )
            }
            DispatchRequest::Reboot => {
                let envelope = CommandEnvelope::Reboot;
                (
                    CommandKind::Reboot,
                    format!("{}/devices/{mac}/command", self.topic_prefix),
                    serde_json::to_vec(&envelope)?,
                    serde_json::to_value(&envelope)?,
                )
            }
        };

        self.store
            .insert_command(DispatchedCommand {
                correlation_id,
                device_id: device.id,
                mac: mac.to_string(),
                kind,
                payload: record_payload,
                status: CommandStatus::Pending,
                created_at: Utc::now(),
                completed_at: None,
                error: None,
            })
            .await?;

        self.transport.publish(&topic, wire_payload).await?;

        info!("dispatched {kind:?} to {mac} (correlation {correlation_id})");
        Ok(correlation_id)
    }

    /// Apply an ack: pending -> terminal, stamped with completion time.
    /// Duplicate and unknown acks are accepted and ignored.
    async fn acknowledge(
        &self,
        correlation_id: Uuid,
        status: CommandStatus,
        error: Option<String>,
    ) {
        if !status.is_terminal() {
            warn!("ignoring ack with non-terminal status for {correlation_id}");
            return;
        }

        let completed = match self
            .store
            .complete_command(correlation_id, status, Utc::now(), error.clone())
            .await
        {
            Ok(completed) => completed,
            Err(e) => {
                warn!("failed to record ack for {correlation_id}: {e}");
                return;
            }
        };

        let Some(command) = completed else {
            debug!("ack for unknown or already-terminal command {correlation_id}, ignoring");
            return;
        };

        info!("command {correlation_id} -> {status:?}");

        let (event_type, id_field) = match command.kind {
            CommandKind::ConfigPush => (events::CONFIG_ACK, "config_id"),
            CommandKind::Upgrade => (events::UPGRADE_ACK, "upgrade_id"),
            // Reboots are fire-and-forget on the wire; nothing to fan out.
            CommandKind::Reboot => return,
        };

        self.hub
            .broadcast(
                event_type,
                json!({
                    id_field: correlation_id,
                    "mac": command.mac,
                    "status": status,
                    "error": error,
                }),
            )
            .await;
    }

    /// Dispatch an upgrade to every online device matching the filter.
    /// Partial failure is expected and reported as counts.
    async fn batch_upgrade(
        &self,
        spec: UpgradeSpec,
        group: Option<&str>,
        model: Option<&str>,
    ) -> BatchOutcome {
        let devices = match self.store.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("batch upgrade: failed to list devices: {e}");
                return BatchOutcome::default();
            }
        };

        let mut outcome = BatchOutcome::default();
        for device in devices {
            if device.status != crate::store::schema::DeviceStatus::Online {
                continue;
            }
            if group.is_some_and(|g| device.group != g) {
                continue;
            }
            if model.is_some_and(|m| !device.model.contains(m)) {
                continue;
            }

            match self
                .dispatch_one(&device.mac, DispatchRequest::Upgrade(spec.clone()))
                .await
            {
                Ok(_) => outcome.dispatched += 1,
                Err(e) => {
                    warn!("batch upgrade: dispatch to {} failed: {e}", device.mac);
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}

/// Handle for controlling the DispatchActor
#[derive(Clone)]
pub struct DispatchHandle {
    sender: mpsc::Sender<DispatchCommand>,
}

impl DispatchHandle {
    pub fn spawn(
        store: Arc<dyn DeviceStore>,
        hub: Arc<Hub>,
        transport: Arc<dyn CommandTransport>,
        topic_prefix: String,
    ) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let actor = DispatchActor::new(store, hub, transport, topic_prefix, rx);
        tokio::spawn(actor.run());
        Self { sender: tx }
    }

    /// Dispatch one command; resolves once the publish is confirmed or has
    /// failed. The eventual device-side outcome arrives later via the ack
    /// channel.
    pub async fn dispatch(&self, mac: String, request: DispatchRequest) -> anyhow::Result<Uuid> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DispatchCommand::Dispatch {
                mac,
                request,
                respond_to: tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("dispatcher is gone"))?;
        rx.await.map_err(|_| anyhow::anyhow!("dispatcher dropped request"))?
    }

    /// Feed an inbound ack into the dispatcher.
    pub async fn acknowledge(
        &self,
        correlation_id: Uuid,
        status: CommandStatus,
        error: Option<String>,
    ) {
        let _ = self
            .sender
            .send(DispatchCommand::Acknowledge {
                correlation_id,
                status,
                error,
            })
            .await;
    }

    pub async fn batch_upgrade(
        &self,
        spec: UpgradeSpec,
        group: Option<String>,
        model: Option<String>,
    ) -> BatchOutcome {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(DispatchCommand::BatchUpgrade {
                spec,
                group,
                model,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return BatchOutcome::default();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(DispatchCommand::Shutdown).await;
    }
}
