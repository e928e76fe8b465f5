//! MQTT boundary: inbound adapter and outbound command transport
//!
//! The event loop task decodes wire payloads into domain events and hands
//! them to the ingest and dispatch actors, keeping the transport library's
//! delivery callbacks out of domain logic. Malformed payloads are dropped
//! and logged, never fatal. A broker outage degrades the process (the loop
//! retries with a short sleep); it never crashes it.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actors::dispatch::{CommandTransport, DispatchHandle};
use crate::actors::ingest::IngestHandle;
use crate::config::MqttConfig;
use crate::store::schema::CommandStatus;
use crate::{ConfigAckPayload, HeartbeatPayload, UpgradeAckPayload};

/// Bounded wait for transport-level publish confirmation
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay before re-polling after an event loop error
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Domain events decoded from inbound wire messages
#[derive(Debug)]
pub enum InboundEvent {
    Heartbeat(HeartbeatPayload),
    ConfigAck(ConfigAckPayload),
    UpgradeAck(UpgradeAckPayload),
}

/// Outbound publisher with a bounded confirmation wait
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

#[async_trait]
impl CommandTransport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        tokio::time::timeout(
            PUBLISH_TIMEOUT,
            self.client.publish(topic, QoS::AtLeastOnce, false, payload),
        )
        .await
        .map_err(|_| anyhow::anyhow!("MQTT publish timed out"))??;
        Ok(())
    }
}

/// Create the broker connection and queue the device-topic subscriptions.
///
/// The subscriptions take effect once the returned event loop is driven by
/// [`spawn_event_loop`]; splitting the two lets the caller hand the
/// transport to the dispatcher before the inbound side needs the
/// dispatcher's handle.
pub async fn connect(config: &MqttConfig) -> anyhow::Result<(MqttTransport, EventLoop)> {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(15));

    let (client, eventloop) = AsyncClient::new(options, 64);

    let prefix = &config.topic_prefix;
    for suffix in ["status", "config/ack", "upgrade/ack"] {
        client
            .subscribe(format!("{prefix}/devices/+/{suffix}"), QoS::AtLeastOnce)
            .await?;
    }

    info!(
        "MQTT adapter subscribing to {prefix}/devices/+/... on {}:{}",
        config.host, config.port
    );

    Ok((MqttTransport { client }, eventloop))
}

/// Drive the event loop, feeding decoded inbound messages to the actors.
pub fn spawn_event_loop(
    eventloop: EventLoop,
    ingest: IngestHandle,
    dispatch: DispatchHandle,
) -> JoinHandle<()> {
    tokio::spawn(run_event_loop(eventloop, ingest, dispatch))
}

async fn run_event_loop(mut eventloop: EventLoop, ingest: IngestHandle, dispatch: DispatchHandle) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(event) = decode_inbound(&publish.topic, &publish.payload) else {
                    continue;
                };
                deliver(event, &ingest, &dispatch).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("MQTT connection error: {e}, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

async fn deliver(event: InboundEvent, ingest: &IngestHandle, dispatch: &DispatchHandle) {
    match event {
        InboundEvent::Heartbeat(payload) => ingest.ingest(payload).await,
        InboundEvent::ConfigAck(ack) => {
            let Some(status) = config_ack_status(&ack.status) else {
                warn!("config ack with unknown status {:?}, dropping", ack.status);
                return;
            };
            dispatch.acknowledge(ack.config_id, status, ack.error).await;
        }
        InboundEvent::UpgradeAck(ack) => {
            let Some(status) = upgrade_ack_status(&ack.status) else {
                warn!("upgrade ack with unknown status {:?}, dropping", ack.status);
                return;
            };
            dispatch.acknowledge(ack.upgrade_id, status, ack.error).await;
        }
    }
}

/// Decode one wire message by topic suffix. Returns `None` (after logging)
/// for unrecognized topics and malformed payloads.
pub fn decode_inbound(topic: &str, payload: &[u8]) -> Option<InboundEvent> {
    if topic.ends_with("/config/ack") {
        return match serde_json::from_slice::<ConfigAckPayload>(payload) {
            Ok(ack) => Some(InboundEvent::ConfigAck(ack)),
            Err(e) => {
                warn!("invalid config ack payload on {topic}: {e}");
                None
            }
        };
    }

    if topic.ends_with("/upgrade/ack") {
        return match serde_json::from_slice::<UpgradeAckPayload>(payload) {
            Ok(ack) => Some(InboundEvent::UpgradeAck(ack)),
            Err(e) => {
                warn!("invalid upgrade ack payload on {topic}: {e}");
                None
            }
        };
    }

    if topic.ends_with("/status") {
        return match serde_json::from_slice::<HeartbeatPayload>(payload) {
            Ok(heartbeat) => Some(InboundEvent::Heartbeat(heartbeat)),
            Err(e) => {
                warn!("invalid heartbeat payload on {topic}: {e}");
                None
            }
        };
    }

    debug!("message on unrecognized topic {topic}, dropping");
    None
}

fn config_ack_status(raw: &str) -> Option<CommandStatus> {
    match raw {
        "applied" => Some(CommandStatus::Applied),
        "failed" => Some(CommandStatus::Failed),
        _ => None,
    }
}

fn upgrade_ack_status(raw: &str) -> Option<CommandStatus> {
    match raw {
        "success" => Some(CommandStatus::Success),
        "failed" => Some(CommandStatus::Failed),
        _ => None,
    }
}
