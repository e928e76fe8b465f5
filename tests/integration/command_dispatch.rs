//! Command dispatch, correlation and ack handling

use chrono::Utc;
use fleetgate::actors::dispatch::DispatchHandle;
use fleetgate::actors::messages::{DispatchRequest, UpgradeSpec};
use fleetgate::store::schema::CommandStatus;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use uuid::Uuid;

use crate::helpers::*;

const PREFIX: &str = "fleetgate";

fn upgrade_spec() -> UpgradeSpec {
    UpgradeSpec {
        version: "2.1.0".to_string(),
        url: "https://firmware.example.com/2.1.0.bin".to_string(),
        sha256: "deadbeef".repeat(8),
    }
}

#[tokio::test]
async fn test_config_push_records_pending_and_publishes() {
    let (store, hub, _engine) = test_system();
    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:03:00:01", 10.0, 10.0), Utc::now())
        .await
        .unwrap();

    let transport = RecordingTransport::new();
    let dispatcher = DispatchHandle::spawn(
        store.clone(),
        hub,
        transport.clone(),
        PREFIX.to_string(),
    );

    let correlation_id = dispatcher
        .dispatch(
            "aa:bb:cc:03:00:01".to_string(),
            DispatchRequest::ConfigPush {
                content: "wifi.ssid=lab".to_string(),
            },
        )
        .await
        .unwrap();

    let published = transport.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "fleetgate/devices/aa:bb:cc:03:00:01/config");
    assert_eq!(
        published[0].1["config_id"],
        serde_json::json!(correlation_id)
    );
    assert_eq!(published[0].1["content"], "wifi.ssid=lab");

    let command = store.get_command(correlation_id).await.unwrap().unwrap();
    assert_eq!(command.status, CommandStatus::Pending);
    assert!(command.completed_at.is_none());

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_ack_completes_command_and_fans_out() {
    let (store, hub, _engine) = test_system();
    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:03:00:02", 10.0, 10.0), Utc::now())
        .await
        .unwrap();

    let dispatcher = DispatchHandle::spawn(
        store.clone(),
        hub.clone(),
        RecordingTransport::new(),
        PREFIX.to_string(),
    );

    let correlation_id = dispatcher
        .dispatch(
            "aa:bb:cc:03:00:02".to_string(),
            DispatchRequest::ConfigPush {
                content: "dns=1.1.1.1".to_string(),
            },
        )
        .await
        .unwrap();

    let mut observer = hub.subscribe().await;
    dispatcher
        .acknowledge(correlation_id, CommandStatus::Applied, None)
        .await;

    let frame = next_frame(&mut observer).await;
    assert_eq!(frame["type"], "config_ack");
    assert_eq!(frame["data"]["config_id"], serde_json::json!(correlation_id));
    assert_eq!(frame["data"]["status"], "applied");

    let command = store.get_command(correlation_id).await.unwrap().unwrap();
    assert_eq!(command.status, CommandStatus::Applied);
    assert!(command.completed_at.is_some());

    // A duplicate ack changes nothing and emits nothing.
    dispatcher
        .acknowledge(correlation_id, CommandStatus::Failed, None)
        .await;
    dispatcher.shutdown().await;

    let command = store.get_command(correlation_id).await.unwrap().unwrap();
    assert_eq!(command.status, CommandStatus::Applied);
}

#[tokio::test]
async fn test_ack_for_unknown_correlation_is_ignored() {
    let (store, hub, _engine) = test_system();
    let dispatcher = DispatchHandle::spawn(
        store.clone(),
        hub.clone(),
        RecordingTransport::new(),
        PREFIX.to_string(),
    );

    let mut observer = hub.subscribe().await;
    dispatcher
        .acknowledge(Uuid::new_v4(), CommandStatus::Success, None)
        .await;
    dispatcher.shutdown().await;

    // No frame was broadcast for the stray ack.
    hub.broadcast("probe", serde_json::json!({})).await;
    assert_eq!(next_frame(&mut observer).await["type"], "probe");
}

#[tokio::test]
async fn test_dispatch_to_unknown_device_fails() {
    let (store, hub, _engine) = test_system();
    let dispatcher = DispatchHandle::spawn(
        store,
        hub,
        RecordingTransport::new(),
        PREFIX.to_string(),
    );

    let result = dispatcher
        .dispatch("00:00:00:00:00:00".to_string(), DispatchRequest::Reboot)
        .await;
    assert!(result.is_err());

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_publish_failure_leaves_command_pending() {
    let (store, hub, _engine) = test_system();
    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:03:00:03", 10.0, 10.0), Utc::now())
        .await
        .unwrap();

    let dispatcher = DispatchHandle::spawn(
        store.clone(),
        hub,
        Arc::new(FailingTransport),
        PREFIX.to_string(),
    );

    let result = dispatcher
        .dispatch(
            "aa:bb:cc:03:00:03".to_string(),
            DispatchRequest::Upgrade(upgrade_spec()),
        )
        .await;
    assert!(result.is_err());

    // The record survives as pending for the operator to inspect.
    let commands = store.list_commands(Some("aa:bb:cc:03:00:03")).await.unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].status, CommandStatus::Pending);

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_batch_upgrade_targets_matching_online_devices() {
    let (store, hub, _engine) = test_system();

    // Two fresh devices and one long-silent one.
    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:03:01:01", 10.0, 10.0), Utc::now())
        .await
        .unwrap();
    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:03:01:02", 10.0, 10.0), Utc::now())
        .await
        .unwrap();
    store
        .upsert_heartbeat(
            &heartbeat("aa:bb:cc:03:01:03", 10.0, 10.0),
            Utc::now() - chrono::Duration::seconds(600),
        )
        .await
        .unwrap();
    store
        .mark_stale_offline(Utc::now() - chrono::Duration::seconds(120))
        .await
        .unwrap();

    let transport = RecordingTransport::new();
    let dispatcher = DispatchHandle::spawn(
        store.clone(),
        hub,
        transport.clone(),
        PREFIX.to_string(),
    );

    let outcome = dispatcher.batch_upgrade(upgrade_spec(), None, None).await;
    assert_eq!(outcome.dispatched, 2);
    assert_eq!(outcome.failed, 0);

    // Only the online devices saw a publish.
    let topics: Vec<String> = transport
        .published()
        .await
        .into_iter()
        .map(|(topic, _)| topic)
        .collect();
    assert_eq!(topics.len(), 2);
    assert!(!topics.iter().any(|t| t.contains("aa:bb:cc:03:01:03")));

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_upgrade_ack_success_fans_out() {
    let (store, hub, _engine) = test_system();
    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:03:02:01", 10.0, 10.0), Utc::now())
        .await
        .unwrap();

    let dispatcher = DispatchHandle::spawn(
        store.clone(),
        hub.clone(),
        RecordingTransport::new(),
        PREFIX.to_string(),
    );

    let correlation_id = dispatcher
        .dispatch(
            "aa:bb:cc:03:02:01".to_string(),
            DispatchRequest::Upgrade(upgrade_spec()),
        )
        .await
        .unwrap();

    let mut observer = hub.subscribe().await;
    dispatcher
        .acknowledge(correlation_id, CommandStatus::Success, None)
        .await;

    let frame = next_frame(&mut observer).await;
    assert_eq!(frame["type"], "upgrade_ack");
    assert_eq!(
        frame["data"]["upgrade_id"],
        serde_json::json!(correlation_id)
    );
    assert_eq!(frame["data"]["status"], "success");

    dispatcher.shutdown().await;
}
