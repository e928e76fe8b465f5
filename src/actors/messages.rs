//! Message types for actor communication

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::store::schema::CommandStatus;
use crate::HeartbeatPayload;

/// Messages consumed by the telemetry ingestor
#[derive(Debug)]
pub enum IngestMessage {
    /// A decoded heartbeat from the inbound adapter
    Heartbeat(HeartbeatPayload),

    /// Gracefully shut down the ingestor
    Shutdown,
}

/// Commands consumed by the liveness monitor
#[derive(Debug)]
pub enum LivenessCommand {
    /// Run one sweep immediately, bypassing the interval timer
    ///
    /// Responds with the number of devices transitioned to offline.
    /// Used by tests and manual refresh operations.
    TickNow { respond_to: oneshot::Sender<usize> },

    /// Gracefully shut down the monitor
    Shutdown,
}

/// Commands consumed by the retention sweeper
#[derive(Debug)]
pub enum RetentionCommand {
    /// Run one cleanup immediately; responds with deleted row count
    SweepNow { respond_to: oneshot::Sender<usize> },

    /// Gracefully shut down the sweeper
    Shutdown,
}

/// What to send to a device when dispatching a command
#[derive(Debug, Clone)]
pub enum DispatchRequest {
    ConfigPush { content: String },
    Upgrade(UpgradeSpec),
    Reboot,
}

#[derive(Debug, Clone)]
pub struct UpgradeSpec {
    pub version: String,
    pub url: String,
    pub sha256: String,
}

/// Result of a batch upgrade: per-device dispatches are independent, partial
/// failure is reported as counts, not rolled back.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BatchOutcome {
    pub dispatched: usize,
    pub failed: usize,
}

/// Commands consumed by the command dispatcher
#[derive(Debug)]
pub enum DispatchCommand {
    /// Publish a command to one device and record it as pending
    Dispatch {
        mac: String,
        request: DispatchRequest,
        respond_to: oneshot::Sender<anyhow::Result<Uuid>>,
    },

    /// Apply an inbound ack to the matching pending command
    ///
    /// Unknown or already-terminal correlation ids are ignored.
    Acknowledge {
        correlation_id: Uuid,
        status: CommandStatus,
        error: Option<String>,
    },

    /// Dispatch an upgrade to every online device matching the filter
    BatchUpgrade {
        spec: UpgradeSpec,
        group: Option<String>,
        model: Option<String>,
        respond_to: oneshot::Sender<BatchOutcome>,
    },

    /// Gracefully shut down the dispatcher
    Shutdown,
}
