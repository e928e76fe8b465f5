//! Threshold alert engine
//!
//! Evaluates each heartbeat's metrics against live-configured thresholds.
//! Per metric, per device:
//!
//! ```text
//! value < threshold:   resolve the open alert if any (auto-clear)
//! value >= threshold:  update the open alert in place (value + severity),
//!                      or raise a fresh one and notify exactly once
//! ```
//!
//! Raising and clearing share one threshold, so a value oscillating around
//! it can flap between raised and resolved. The raise-or-update sequence is
//! atomic inside the store, which is what keeps the at-most-one-unresolved
//! invariant under concurrent heartbeats.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::hub::{events, Hub};
use crate::notify::{dispatch_notification, Notifier};
use crate::store::schema::{settings, Alert, AlertSeverity, Device};
use crate::store::{AlertTransition, DeviceStore};
use crate::HeartbeatPayload;

/// Value at or above `factor * threshold` escalates to critical
const CRITICAL_FACTOR: f64 = 1.2;

const DEFAULT_CPU_THRESHOLD: f64 = 90.0;
const DEFAULT_MEM_THRESHOLD: f64 = 90.0;
const DEFAULT_CONNTRACK_THRESHOLD: f64 = 50_000.0;

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    cpu: f64,
    memory: f64,
    conntrack: f64,
}

pub struct AlertEngine {
    store: Arc<dyn DeviceStore>,
    hub: Arc<Hub>,
    notifier: Arc<dyn Notifier>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn DeviceStore>, hub: Arc<Hub>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            hub,
            notifier,
        }
    }

    /// Thresholds are read fresh on every evaluation so settings changes
    /// apply to the next heartbeat without restart.
    async fn thresholds(&self) -> Thresholds {
        let read = |key: &'static str, default: f64| async move {
            match self.store.get_setting(key).await {
                Ok(Some(raw)) => match raw.parse::<f64>() {
                    Ok(v) if v > 0.0 => v,
                    _ => default,
                },
                Ok(None) => default,
                Err(e) => {
                    warn!("failed to read {key}: {e}");
                    default
                }
            }
        };

        Thresholds {
            cpu: read(settings::ALERT_CPU_THRESHOLD, DEFAULT_CPU_THRESHOLD).await,
            memory: read(settings::ALERT_MEM_THRESHOLD, DEFAULT_MEM_THRESHOLD).await,
            conntrack: read(
                settings::ALERT_CONNTRACK_THRESHOLD,
                DEFAULT_CONNTRACK_THRESHOLD,
            )
            .await,
        }
    }

    /// Evaluate all tracked metrics of one heartbeat. Called synchronously
    /// by the telemetry ingestor.
    #[instrument(skip(self, device, payload), fields(mac = %device.mac))]
    pub async fn evaluate_heartbeat(&self, device: &Device, payload: &HeartbeatPayload) {
        let thresholds = self.thresholds().await;

        self.evaluate(device, "cpu", payload.cpu_usage, thresholds.cpu)
            .await;
        self.evaluate(device, "memory", payload.mem_usage, thresholds.memory)
            .await;
        self.evaluate(
            device,
            "conntrack",
            payload.conntrack as f64,
            thresholds.conntrack,
        )
        .await;
    }

    /// Evaluate one named metric value against its threshold.
    ///
    /// The engine is metric-agnostic; "cpu", "memory" and "conntrack" are
    /// just the metrics the ingestor currently feeds it.
    pub async fn evaluate(&self, device: &Device, metric: &str, value: f64, threshold: f64) {
        if value < threshold {
            match self.store.resolve_alert(device.id, metric, Utc::now()).await {
                Ok(Some(alert)) => {
                    info!(
                        "alert resolved: device={} metric={} value={value:.1}",
                        alert.device_name, alert.metric
                    );
                }
                Ok(None) => {}
                Err(e) => warn!("failed to resolve alert for {metric}: {e}"),
            }
            return;
        }

        let severity = if value >= threshold * CRITICAL_FACTOR {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };

        let transition = match self
            .store
            .raise_or_update_alert(device.id, &device.name, metric, value, threshold, severity)
            .await
        {
            Ok(transition) => transition,
            Err(e) => {
                warn!("failed to raise alert for {metric}: {e}");
                return;
            }
        };

        match transition {
            AlertTransition::Raised(alert) => {
                info!(
                    "ALERT: device={} metric={metric} value={value:.1} threshold={threshold:.1}",
                    device.name
                );
                self.broadcast_alert(&alert).await;
                // Exactly one notification per raised alert, never blocking
                // the evaluation path.
                dispatch_notification(Arc::clone(&self.notifier), alert);
            }
            AlertTransition::Updated(_) => {
                // Open alert refreshed in place: no event, no duplicate
                // notification.
            }
        }
    }

    async fn broadcast_alert(&self, alert: &Alert) {
        self.hub
            .broadcast(
                events::ALERT,
                json!({
                    "id": alert.id,
                    "device_id": alert.device_id,
                    "device_name": alert.device_name,
                    "metric": alert.metric,
                    "value": alert.value,
                    "threshold": alert.threshold,
                    "severity": alert.severity,
                }),
            )
            .await;
    }
}
