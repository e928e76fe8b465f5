//! In-memory device store (no persistence)
//!
//! Keeps the whole fleet state behind one `RwLock`, which makes every trait
//! operation a single critical section. That is what closes the alert dedup
//! race: raise-or-update holds the write lock for the entire
//! check-then-create sequence.
//!
//! ## Limitations
//!
//! - **No persistence**: all state is lost on restart
//! - **Unbounded samples**: relies on the retention sweep for cleanup

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::HeartbeatPayload;

use super::backend::{AlertTransition, DeviceStore};
use super::error::StoreResult;
use super::schema::{
    Alert, AlertSeverity, CommandStatus, Device, DeviceStatus, DispatchedCommand, MetricSample,
};

#[derive(Default)]
struct Inner {
    devices: HashMap<String, Device>,
    samples: Vec<MetricSample>,
    alerts: Vec<Alert>,
    commands: HashMap<Uuid, DispatchedCommand>,
    settings: HashMap<String, String>,
    next_device_id: u64,
    next_alert_id: u64,
}

/// In-memory implementation of [`DeviceStore`]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_device_id: 1,
                next_alert_id: 1,
                ..Inner::default()
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn upsert_heartbeat(
        &self,
        payload: &HeartbeatPayload,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<Device> {
        let mut inner = self.inner.write().await;

        if let Some(device) = inner.devices.get_mut(&payload.mac) {
            device.status = DeviceStatus::Online;
            device.cpu_usage = payload.cpu_usage;
            device.mem_usage = payload.mem_usage;
            device.uptime_secs = payload.uptime_secs;
            device.last_seen_at = Some(seen_at);
            return Ok(device.clone());
        }

        let id = inner.next_device_id;
        inner.next_device_id += 1;

        debug!("auto-registering device {} (id {id})", payload.mac);

        let device = Device {
            id,
            mac: payload.mac.clone(),
            name: payload.mac.clone(),
            status: DeviceStatus::Online,
            group: String::new(),
            model: String::new(),
            cpu_usage: payload.cpu_usage,
            mem_usage: payload.mem_usage,
            uptime_secs: payload.uptime_secs,
            last_seen_at: Some(seen_at),
            registered_at: seen_at,
        };
        inner.devices.insert(payload.mac.clone(), device.clone());

        Ok(device)
    }

    async fn get_device(&self, mac: &str) -> StoreResult<Option<Device>> {
        let inner = self.inner.read().await;
        Ok(inner.devices.get(mac).cloned())
    }

    async fn list_devices(&self) -> StoreResult<Vec<Device>> {
        let inner = self.inner.read().await;
        let mut devices: Vec<_> = inner.devices.values().cloned().collect();
        devices.sort_by_key(|d| d.id);
        Ok(devices)
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Device>> {
        let mut inner = self.inner.write().await;

        let mut transitioned = Vec::new();
        for device in inner.devices.values_mut() {
            if device.status == DeviceStatus::Online
                && device.last_seen_at.is_some_and(|seen| seen < cutoff)
            {
                device.status = DeviceStatus::Offline;
                transitioned.push(device.clone());
            }
        }

        Ok(transitioned)
    }

    async fn insert_sample(&self, sample: MetricSample) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.samples.push(sample);
        Ok(())
    }

    async fn query_samples(
        &self,
        device_id: u64,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<MetricSample>> {
        let inner = self.inner.read().await;
        Ok(inner
            .samples
            .iter()
            .filter(|s| s.device_id == device_id && s.collected_at >= since)
            .cloned()
            .collect())
    }

    async fn delete_samples_before(&self, before: DateTime<Utc>) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        let len_before = inner.samples.len();
        inner.samples.retain(|s| s.collected_at >= before);
        Ok(len_before - inner.samples.len())
    }

    async fn raise_or_update_alert(
        &self,
        device_id: u64,
        device_name: &str,
        metric: &str,
        value: f64,
        threshold: f64,
        severity: AlertSeverity,
    ) -> StoreResult<AlertTransition> {
        let mut inner = self.inner.write().await;

        if let Some(alert) = inner
            .alerts
            .iter_mut()
            .find(|a| a.device_id == device_id && a.metric == metric && !a.resolved)
        {
            alert.value = value;
            alert.severity = severity;
            return Ok(AlertTransition::Updated(alert.clone()));
        }

        let id = inner.next_alert_id;
        inner.next_alert_id += 1;

        let alert = Alert {
            id,
            device_id,
            device_name: device_name.to_string(),
            metric: metric.to_string(),
            value,
            threshold,
            severity,
            resolved: false,
            created_at: Utc::now(),
            resolved_at: None,
        };
        inner.alerts.push(alert.clone());

        Ok(AlertTransition::Raised(alert))
    }

    async fn resolve_alert(
        &self,
        device_id: u64,
        metric: &str,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<Option<Alert>> {
        let mut inner = self.inner.write().await;

        let Some(alert) = inner
            .alerts
            .iter_mut()
            .find(|a| a.device_id == device_id && a.metric == metric && !a.resolved)
        else {
            return Ok(None);
        };

        alert.resolved = true;
        alert.resolved_at = Some(resolved_at);
        Ok(Some(alert.clone()))
    }

    async fn list_alerts(&self, resolved: Option<bool>) -> StoreResult<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<_> = inner
            .alerts
            .iter()
            .filter(|a| resolved.is_none_or(|r| a.resolved == r))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn insert_command(&self, command: DispatchedCommand) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.commands.insert(command.correlation_id, command);
        Ok(())
    }

    async fn complete_command(
        &self,
        correlation_id: Uuid,
        status: CommandStatus,
        completed_at: DateTime<Utc>,
        error: Option<String>,
    ) -> StoreResult<Option<DispatchedCommand>> {
        let mut inner = self.inner.write().await;

        let Some(command) = inner.commands.get_mut(&correlation_id) else {
            return Ok(None);
        };

        if command.status.is_terminal() {
            return Ok(None);
        }

        command.status = status;
        command.completed_at = Some(completed_at);
        command.error = error;
        Ok(Some(command.clone()))
    }

    async fn get_command(&self, correlation_id: Uuid) -> StoreResult<Option<DispatchedCommand>> {
        let inner = self.inner.read().await;
        Ok(inner.commands.get(&correlation_id).cloned())
    }

    async fn list_commands(&self, mac: Option<&str>) -> StoreResult<Vec<DispatchedCommand>> {
        let inner = self.inner.read().await;
        let mut commands: Vec<_> = inner
            .commands
            .values()
            .filter(|c| mac.is_none_or(|m| c.mac == m))
            .cloned()
            .collect();
        commands.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(commands)
    }

    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
