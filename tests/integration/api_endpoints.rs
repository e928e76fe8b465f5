//! HTTP API tests against a real listening server

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use fleetgate::actors::dispatch::DispatchHandle;
use fleetgate::api::{ApiState, spawn_api_server};
use fleetgate::config::ApiConfig;
use fleetgate::limiter::RateLimiter;
use fleetgate::store::DeviceStore;
use pretty_assertions::assert_eq;

use crate::helpers::*;

async fn spawn_test_api(
    limiter: Option<Arc<RateLimiter>>,
) -> (SocketAddr, Arc<dyn DeviceStore>) {
    let (store, hub, _engine) = test_system();
    let dispatcher = DispatchHandle::spawn(
        store.clone(),
        hub.clone(),
        RecordingTransport::new(),
        "fleetgate".to_string(),
    );

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: false,
    };
    let state = ApiState::new(store.clone(), hub, dispatcher, limiter);
    let addr = spawn_api_server(config, state).await.unwrap();

    (addr, store)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, _store) = spawn_test_api(None).await;

    let response = reqwest::get(format!("http://{addr}/api/v1/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_device_listing_and_metrics() {
    let (addr, store) = spawn_test_api(None).await;

    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:04:00:01", 33.0, 44.0), Utc::now())
        .await
        .unwrap();
    let device = store.get_device("aa:bb:cc:04:00:01").await.unwrap().unwrap();
    store
        .insert_sample(fleetgate::store::schema::MetricSample::from_heartbeat(
            device.id,
            &heartbeat("aa:bb:cc:04:00:01", 33.0, 44.0),
            Utc::now(),
        ))
        .await
        .unwrap();

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/api/v1/devices"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["devices"][0]["mac"], "aa:bb:cc:04:00:01");
    assert_eq!(body["devices"][0]["status"], "online");

    let body: serde_json::Value = reqwest::get(format!(
        "http://{addr}/api/v1/devices/aa:bb:cc:04:00:01/metrics?hours=2"
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["metrics"][0]["cpu_usage"], 33.0);

    // Unknown device is a clean 404.
    let response = reqwest::get(format!(
        "http://{addr}/api/v1/devices/00:00:00:00:00:00/metrics"
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_config_push_endpoint() {
    let (addr, store) = spawn_test_api(None).await;
    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:04:00:02", 10.0, 10.0), Utc::now())
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .post(format!(
            "http://{addr}/api/v1/devices/aa:bb:cc:04:00:02/config"
        ))
        .json(&serde_json::json!({"content": "ntp.server=pool.ntp.org"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    let body: serde_json::Value = response.json().await.unwrap();
    let config_id: uuid::Uuid =
        serde_json::from_value(body["config_id"].clone()).expect("correlation id in response");

    let command = store.get_command(config_id).await.unwrap().unwrap();
    assert_eq!(command.mac, "aa:bb:cc:04:00:02");

    // Command history shows it as pending.
    let body: serde_json::Value = reqwest::get(format!(
        "http://{addr}/api/v1/commands?device=aa:bb:cc:04:00:02"
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["commands"][0]["status"], "pending");
}

#[tokio::test]
async fn test_command_post_to_unknown_device_is_404() {
    let (addr, _store) = spawn_test_api(None).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!(
            "http://{addr}/api/v1/devices/00:00:00:00:00:00/reboot"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_alert_filtering() {
    let (addr, store) = spawn_test_api(None).await;

    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:04:00:03", 10.0, 10.0), Utc::now())
        .await
        .unwrap();
    let device = store.get_device("aa:bb:cc:04:00:03").await.unwrap().unwrap();

    store
        .raise_or_update_alert(
            device.id,
            &device.name,
            "cpu",
            95.0,
            90.0,
            fleetgate::store::schema::AlertSeverity::Warning,
        )
        .await
        .unwrap();
    store
        .raise_or_update_alert(
            device.id,
            &device.name,
            "memory",
            93.0,
            90.0,
            fleetgate::store::schema::AlertSeverity::Warning,
        )
        .await
        .unwrap();
    store.resolve_alert(device.id, "memory", Utc::now()).await.unwrap();

    let body: serde_json::Value =
        reqwest::get(format!("http://{addr}/api/v1/alerts?resolved=false"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["alerts"][0]["metric"], "cpu");

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/api/v1/alerts"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_batch_upgrade_reports_counts() {
    let (addr, store) = spawn_test_api(None).await;
    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:04:00:04", 10.0, 10.0), Utc::now())
        .await
        .unwrap();
    store
        .upsert_heartbeat(&heartbeat("aa:bb:cc:04:00:05", 10.0, 10.0), Utc::now())
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/v1/upgrades/batch"))
        .json(&serde_json::json!({
            "version": "2.1.0",
            "url": "https://firmware.example.com/2.1.0.bin",
            "sha256": "deadbeef",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["dispatched"], 2);
    assert_eq!(body["failed"], 0);
}

#[tokio::test]
async fn test_rate_limiter_rejects_with_429() {
    // One-token bucket with no refill: the second request must bounce.
    let limiter = Arc::new(RateLimiter::new(0.0, 1));
    let (addr, _store) = spawn_test_api(Some(limiter)).await;

    let first = reqwest::get(format!("http://{addr}/api/v1/health"))
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = reqwest::get(format!("http://{addr}/api/v1/health"))
        .await
        .unwrap();
    assert_eq!(second.status(), 429);

    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["error"], "rate limit exceeded");
}
