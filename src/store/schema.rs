//! Row types shared between the store trait and its implementations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::HeartbeatPayload;

/// Device liveness status as derived from telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Registered but never heard from
    Unknown,
    Online,
    Offline,
}

/// A managed appliance
///
/// Status is mutated only by the telemetry ingestor (to online) and the
/// liveness monitor (to offline). Request handlers never write it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: u64,
    pub mac: String,
    pub name: String,
    pub status: DeviceStatus,
    /// Free-form grouping label, used by batch upgrade filters
    #[serde(default)]
    pub group: String,
    /// Hardware model string, used by batch upgrade filters
    #[serde(default)]
    pub model: String,
    pub cpu_usage: f64,
    pub mem_usage: f64,
    pub uptime_secs: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

/// Append-only metric time-series row, one per heartbeat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub device_id: u64,
    pub cpu_usage: f64,
    pub mem_usage: f64,
    pub mem_total: i64,
    pub mem_free: i64,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
    pub conntrack: i64,
    pub uptime_secs: i64,
    pub load_avg: String,
    pub collected_at: DateTime<Utc>,
}

impl MetricSample {
    pub fn from_heartbeat(
        device_id: u64,
        payload: &HeartbeatPayload,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id,
            cpu_usage: payload.cpu_usage,
            mem_usage: payload.mem_usage,
            mem_total: payload.mem_total,
            mem_free: payload.mem_free,
            rx_bytes: payload.rx_bytes,
            tx_bytes: payload.tx_bytes,
            conntrack: payload.conntrack,
            uptime_secs: payload.uptime_secs,
            load_avg: payload.load_avg.clone(),
            collected_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// A threshold violation for one (device, metric) pair
///
/// At most one unresolved alert exists per (device, metric); the store
/// enforces this inside a single atomic raise-or-update operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub device_id: u64,
    pub device_name: String,
    pub metric: String,
    pub value: f64,
    /// Threshold at the time the alert was raised
    pub threshold: f64,
    pub severity: AlertSeverity,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    ConfigPush,
    Upgrade,
    Reboot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    /// Terminal: config push confirmed by the agent
    Applied,
    /// Terminal: upgrade confirmed by the agent
    Success,
    /// Terminal: the agent reported an error
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommandStatus::Pending)
    }
}

/// A command published to a device, correlated with its eventual ack
///
/// Stays `pending` forever if no ack arrives; there is no timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchedCommand {
    pub correlation_id: Uuid,
    pub device_id: u64,
    pub mac: String,
    pub kind: CommandKind,
    pub payload: serde_json::Value,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Well-known settings keys, read fresh on every evaluation/tick
pub mod settings {
    pub const ALERT_CPU_THRESHOLD: &str = "alert_cpu_threshold";
    pub const ALERT_MEM_THRESHOLD: &str = "alert_mem_threshold";
    pub const ALERT_CONNTRACK_THRESHOLD: &str = "alert_conntrack_threshold";
    pub const OFFLINE_THRESHOLD: &str = "offline_threshold";
    pub const METRICS_RETENTION_DAYS: &str = "metrics_retention_days";
    pub const ALERT_NOTIFY_METHOD: &str = "alert_notify_method";
    pub const ALERT_WEBHOOK_URL: &str = "alert_webhook_url";
    pub const SMTP_HOST: &str = "smtp_host";
    pub const SMTP_PORT: &str = "smtp_port";
    pub const SMTP_FROM: &str = "smtp_from";
    pub const SMTP_TO: &str = "smtp_to";
    pub const SMTP_USER: &str = "smtp_user";
    pub const SMTP_PASS: &str = "smtp_pass";
}
