//! Device store trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::HeartbeatPayload;

use super::error::StoreResult;
use super::schema::{
    Alert, AlertSeverity, CommandStatus, Device, DispatchedCommand, MetricSample,
};

/// Outcome of the atomic raise-or-update alert operation
#[derive(Debug, Clone)]
pub enum AlertTransition {
    /// No unresolved alert existed; a fresh one was created
    Raised(Alert),

    /// An unresolved alert existed; its value and severity were refreshed
    Updated(Alert),
}

/// Trait for the authoritative device/alert/command state
///
/// All control-plane activities share one store handle. Implementations must
/// be `Send + Sync` and must make each individual operation atomic; in
/// particular [`raise_or_update_alert`](DeviceStore::raise_or_update_alert)
/// is a single critical section so that concurrent heartbeats for the same
/// (device, metric) cannot both observe "no unresolved alert" and raise
/// duplicates.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    /// Upsert a device from a heartbeat: status becomes online, metrics and
    /// last-seen are refreshed. Unknown MACs are auto-registered.
    ///
    /// Last-write-wins: a late heartbeat simply overwrites newer state.
    async fn upsert_heartbeat(
        &self,
        payload: &HeartbeatPayload,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<Device>;

    async fn get_device(&self, mac: &str) -> StoreResult<Option<Device>>;

    async fn list_devices(&self) -> StoreResult<Vec<Device>>;

    /// Batch-transition every online device with `last_seen_at < cutoff` to
    /// offline, returning the transitioned devices.
    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Device>>;

    // ------------------------------------------------------------------
    // Metric samples
    // ------------------------------------------------------------------

    async fn insert_sample(&self, sample: MetricSample) -> StoreResult<()>;

    /// Samples for a device collected at or after `since`, oldest first.
    async fn query_samples(
        &self,
        device_id: u64,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<MetricSample>>;

    /// Delete samples older than `before` (retention sweep). Returns the
    /// number of rows removed.
    async fn delete_samples_before(&self, before: DateTime<Utc>) -> StoreResult<usize>;

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    /// Atomically raise a new alert or refresh the existing unresolved one
    /// for (device, metric). Creation uses the given severity and threshold;
    /// an update overwrites value and severity in place.
    async fn raise_or_update_alert(
        &self,
        device_id: u64,
        device_name: &str,
        metric: &str,
        value: f64,
        threshold: f64,
        severity: AlertSeverity,
    ) -> StoreResult<AlertTransition>;

    /// Resolve the unresolved alert for (device, metric) if one exists.
    async fn resolve_alert(
        &self,
        device_id: u64,
        metric: &str,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<Option<Alert>>;

    /// List alerts, optionally filtered by resolved flag, newest first.
    async fn list_alerts(&self, resolved: Option<bool>) -> StoreResult<Vec<Alert>>;

    // ------------------------------------------------------------------
    // Dispatched commands
    // ------------------------------------------------------------------

    async fn insert_command(&self, command: DispatchedCommand) -> StoreResult<()>;

    /// Transition a pending command to a terminal status, stamping the
    /// completion time. Returns `None` when the correlation id is unknown or
    /// the command already reached a terminal state (duplicate/late acks are
    /// ignored).
    async fn complete_command(
        &self,
        correlation_id: Uuid,
        status: CommandStatus,
        completed_at: DateTime<Utc>,
        error: Option<String>,
    ) -> StoreResult<Option<DispatchedCommand>>;

    async fn get_command(&self, correlation_id: Uuid) -> StoreResult<Option<DispatchedCommand>>;

    /// List commands, optionally filtered by device MAC, newest first.
    async fn list_commands(&self, mac: Option<&str>) -> StoreResult<Vec<DispatchedCommand>>;

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> StoreResult<()>;
}
