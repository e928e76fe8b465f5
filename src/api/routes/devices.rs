//! Device listing and metric history endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{error::ApiError, error::ApiResult, state::ApiState};

/// Query parameters for metric history
#[derive(Debug, Deserialize)]
pub struct MetricQuery {
    /// Hours of history to return (default: 24, max: 720)
    hours: Option<i64>,
}

/// GET /api/v1/devices
///
/// List all registered devices with current status and metrics
pub async fn list_devices(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let devices = state.store.list_devices().await?;

    Ok(Json(json!({
        "devices": devices,
        "count": devices.len(),
    })))
}

/// GET /api/v1/devices/:mac
pub async fn get_device(
    State(state): State<ApiState>,
    Path(mac): Path<String>,
) -> ApiResult<Json<Value>> {
    let device = state
        .store
        .get_device(&mac)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {mac} not found")))?;

    Ok(Json(serde_json::to_value(device).map_err(|e| ApiError::Internal(e.to_string()))?))
}

/// GET /api/v1/devices/:mac/metrics
///
/// Metric samples for one device within the requested window, oldest first
pub async fn get_device_metrics(
    State(state): State<ApiState>,
    Path(mac): Path<String>,
    Query(query): Query<MetricQuery>,
) -> ApiResult<Json<Value>> {
    let hours = query.hours.unwrap_or(24).clamp(1, 720);

    let device = state
        .store
        .get_device(&mac)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {mac} not found")))?;

    let since = Utc::now() - Duration::hours(hours);
    let metrics = state.store.query_samples(device.id, since).await?;

    Ok(Json(json!({
        "mac": mac,
        "hours": hours,
        "count": metrics.len(),
        "metrics": metrics,
    })))
}
