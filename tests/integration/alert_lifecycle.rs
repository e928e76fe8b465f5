//! Alert lifecycle driven through the ingest pipeline

use fleetgate::actors::ingest::IngestHandle;
use fleetgate::store::schema::AlertSeverity;
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_alert_escalates_in_place_and_auto_resolves() {
    let (store, hub, engine) = test_system();
    let mut observer = hub.subscribe().await;
    let ingest = IngestHandle::spawn(store.clone(), engine, hub.clone());
    let mac = "aa:bb:cc:02:00:01";

    // Above the 90% default: one warning alert, one alert frame.
    ingest.ingest(heartbeat(mac, 95.0, 30.0)).await;
    assert_eq!(next_frame(&mut observer).await["type"], "alert");
    next_frame(&mut observer).await; // device_status

    // Still firing, now past 1.2x the threshold: same row, now critical,
    // and no second alert frame.
    ingest.ingest(heartbeat(mac, 120.0, 30.0)).await;
    assert_eq!(next_frame(&mut observer).await["type"], "device_status");

    let alerts = store.list_alerts(Some(false)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].value, 120.0);
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);

    // Recovery resolves it without a new alert frame.
    ingest.ingest(heartbeat(mac, 50.0, 30.0)).await;
    assert_eq!(next_frame(&mut observer).await["type"], "device_status");

    let unresolved = store.list_alerts(Some(false)).await.unwrap();
    assert!(unresolved.is_empty());
    let resolved = store.list_alerts(Some(true)).await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].resolved_at.is_some());

    ingest.shutdown().await;
}

#[tokio::test]
async fn test_relapse_after_recovery_opens_a_fresh_alert() {
    let (store, hub, engine) = test_system();
    let ingest = IngestHandle::spawn(store.clone(), engine, hub.clone());
    let mut observer = hub.subscribe().await;
    let mac = "aa:bb:cc:02:00:02";

    ingest.ingest(heartbeat(mac, 95.0, 30.0)).await;
    next_frame(&mut observer).await;
    next_frame(&mut observer).await;

    ingest.ingest(heartbeat(mac, 50.0, 30.0)).await;
    next_frame(&mut observer).await;

    ingest.ingest(heartbeat(mac, 96.0, 30.0)).await;
    assert_eq!(next_frame(&mut observer).await["type"], "alert");

    let all = store.list_alerts(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let unresolved = store.list_alerts(Some(false)).await.unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].value, 96.0);

    ingest.shutdown().await;
}

#[tokio::test]
async fn test_metrics_alert_independently() {
    let (store, hub, engine) = test_system();
    let ingest = IngestHandle::spawn(store.clone(), engine, hub.clone());
    let mut observer = hub.subscribe().await;
    let mac = "aa:bb:cc:02:00:03";

    // CPU and memory both above their thresholds in one heartbeat.
    ingest.ingest(heartbeat(mac, 95.0, 93.0)).await;

    let first = next_frame(&mut observer).await;
    let second = next_frame(&mut observer).await;
    assert_eq!(first["type"], "alert");
    assert_eq!(second["type"], "alert");

    let mut metrics: Vec<String> = store
        .list_alerts(Some(false))
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.metric)
        .collect();
    metrics.sort();
    assert_eq!(metrics, vec!["cpu".to_string(), "memory".to_string()]);

    ingest.shutdown().await;
}
