//! Alert notification sinks
//!
//! The alert engine fires exactly one notification per raised alert through
//! a [`Notifier`]. Delivery is fire-and-forget: failures are logged and
//! never retried, and never surface back into metric evaluation.
//!
//! The production notifier ([`SettingsNotifier`]) re-reads the configured
//! method and its parameters from the store on every dispatch, so switching
//! from webhook to email (or editing the URL) takes effect without restart.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::store::schema::{settings, Alert, AlertSeverity};
use crate::store::DeviceStore;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()>;
}

fn severity_label(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Warning => "warning",
        AlertSeverity::Critical => "critical",
    }
}

/// Log-only sink, also the fallback when nothing is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(
            "ALERT NOTIFICATION [{}]: device={} metric={} value={:.1} threshold={:.1}",
            severity_label(alert.severity),
            alert.device_name,
            alert.metric,
            alert.value,
            alert.threshold
        );
        Ok(())
    }
}

/// POSTs the alert as JSON to a configured URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, alert), fields(device = %alert.device_name, metric = %alert.metric))]
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        let payload = json!({
            "device_name": alert.device_name,
            "device_id": alert.device_id,
            "metric": alert.metric,
            "value": alert.value,
            "threshold": alert.threshold,
            "severity": severity_label(alert.severity),
            "time": alert.created_at.to_rfc3339(),
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("webhook returned status {}", response.status());
        }
        Ok(())
    }
}

/// SMTP relay parameters, read from settings at dispatch time
#[derive(Debug, Clone)]
pub struct SmtpParams {
    pub host: String,
    pub port: u16,
    pub from: String,
    pub to: String,
    pub user: Option<String>,
    pub pass: Option<String>,
}

/// Sends a plain-text alert mail through a relay
pub struct EmailNotifier {
    params: SmtpParams,
}

impl EmailNotifier {
    pub fn new(params: SmtpParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    #[instrument(skip(self, alert), fields(device = %alert.device_name, metric = %alert.metric))]
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        use lettre::message::header::ContentType;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

        let subject = format!(
            "[fleetgate {}] {} alert on {}",
            severity_label(alert.severity),
            alert.metric,
            alert.device_name
        );
        let body = format!(
            "Device: {} (id: {})\nMetric: {}\nValue: {:.1}\nThreshold: {:.1}\nSeverity: {}\nTime: {}",
            alert.device_name,
            alert.device_id,
            alert.metric,
            alert.value,
            alert.threshold,
            severity_label(alert.severity),
            alert.created_at.to_rfc3339(),
        );

        let email = Message::builder()
            .from(self.params.from.parse()?)
            .to(self.params.to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.params.host)
                .port(self.params.port);
        if let (Some(user), Some(pass)) = (&self.params.user, &self.params.pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        builder.build().send(email).await?;
        Ok(())
    }
}

/// Production notifier: selects the sink per dispatch from live settings
///
/// `alert_notify_method` chooses webhook, email or log; absence means no
/// notification at all (matching a fleet that has not configured alerting).
pub struct SettingsNotifier {
    store: Arc<dyn DeviceStore>,
    client: reqwest::Client,
}

impl SettingsNotifier {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
        }
    }

    async fn setting(&self, key: &str) -> Option<String> {
        match self.store.get_setting(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("failed to read setting {key}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl Notifier for SettingsNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        let Some(method) = self.setting(settings::ALERT_NOTIFY_METHOD).await else {
            return Ok(());
        };

        match method.as_str() {
            "webhook" => {
                let Some(url) = self.setting(settings::ALERT_WEBHOOK_URL).await else {
                    warn!("alert webhook URL not configured");
                    return Ok(());
                };
                WebhookNotifier::new(self.client.clone(), url)
                    .notify(alert)
                    .await
            }
            "email" => {
                let Some(host) = self.setting(settings::SMTP_HOST).await else {
                    warn!("email alert: smtp_host not configured");
                    return Ok(());
                };
                let (Some(from), Some(to)) = (
                    self.setting(settings::SMTP_FROM).await,
                    self.setting(settings::SMTP_TO).await,
                ) else {
                    warn!("email alert: SMTP settings incomplete (need smtp_from, smtp_to)");
                    return Ok(());
                };
                let port = self
                    .setting(settings::SMTP_PORT)
                    .await
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(25);

                let params = SmtpParams {
                    host,
                    port,
                    from,
                    to,
                    user: self.setting(settings::SMTP_USER).await,
                    pass: self.setting(settings::SMTP_PASS).await,
                };
                EmailNotifier::new(params).notify(alert).await
            }
            "log" => LogNotifier.notify(alert).await,
            other => {
                warn!("unknown alert_notify_method {other:?}, ignoring");
                Ok(())
            }
        }
    }
}

/// Fire-and-forget helper used by the alert engine.
pub fn dispatch_notification(notifier: Arc<dyn Notifier>, alert: Alert) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&alert).await {
            error!(
                "notification for {}/{} failed: {e}",
                alert.device_name, alert.metric
            );
        }
    });
}
