pub mod actors;
pub mod alerts;
pub mod api;
pub mod config;
pub mod hub;
pub mod limiter;
pub mod mqtt;
pub mod notify;
pub mod store;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Heartbeat published by an appliance on `{prefix}/devices/{mac}/status`.
///
/// Every heartbeat is self-describing: the MAC identifies the device, the
/// rest is the current metric snapshot. Heartbeats are delivered at least
/// once and in no particular order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub mac: String,
    pub cpu_usage: f64,
    pub mem_usage: f64,
    #[serde(default)]
    pub mem_total: i64,
    #[serde(default)]
    pub mem_free: i64,
    #[serde(default)]
    pub rx_bytes: i64,
    #[serde(default)]
    pub tx_bytes: i64,
    #[serde(default)]
    pub conntrack: i64,
    #[serde(default)]
    pub uptime_secs: i64,
    #[serde(default)]
    pub load_avg: String,
}

/// Config push sent to an appliance on `{prefix}/devices/{mac}/config`.
///
/// The id is the correlation id the agent must echo back in its ack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEnvelope {
    pub config_id: Uuid,
    pub content: String,
}

/// Ack for a config push, received on `{prefix}/devices/{mac}/config/ack`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigAckPayload {
    pub config_id: Uuid,
    /// "applied" or "failed"
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Command sent to an appliance on `{prefix}/devices/{mac}/command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommandEnvelope {
    Reboot,
    Upgrade {
        upgrade_id: Uuid,
        version: String,
        url: String,
        sha256: String,
    },
}

/// Ack for a firmware upgrade, received on `{prefix}/devices/{mac}/upgrade/ack`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeAckPayload {
    pub upgrade_id: Uuid,
    /// "success" or "failed"
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}
