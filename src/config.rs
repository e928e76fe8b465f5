use std::net::SocketAddr;

use tracing::trace;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub api: ApiConfig,

    /// Admission control for the HTTP surface (optional - disabled if absent)
    pub rate_limit: Option<RateLimitConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic prefix for the device hierarchy, e.g. "fleetgate/devices/{mac}/status"
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            topic_prefix: default_topic_prefix(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RateLimitConfig {
    /// Tokens per second per client
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Maximum burst size per client
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_mqtt_host() -> String {
    String::from("localhost")
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    String::from("fleetgate-server")
}

fn default_topic_prefix() -> String {
    String::from("fleetgate")
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().expect("valid default bind addr")
}

fn default_true() -> bool {
    true
}

fn default_rate() -> f64 {
    10.0
}

fn default_burst() -> u32 {
    20
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
