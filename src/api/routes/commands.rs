//! Command dispatch and history endpoints
//!
//! POST handlers resolve the device first so an unknown MAC is a clean 404;
//! a dispatch that fails after that (publish path down, dispatcher gone)
//! maps to 503. A 202 response means the command was recorded and published,
//! not that the device has applied it; completion arrives later on the
//! WebSocket feed.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::actors::messages::{BatchOutcome, DispatchRequest, UpgradeSpec};
use crate::api::{error::ApiError, error::ApiResult, state::ApiState};

#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    /// Filter by device MAC
    device: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigPushBody {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeBody {
    pub version: String,
    pub url: String,
    pub sha256: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchUpgradeBody {
    pub version: String,
    pub url: String,
    pub sha256: String,
    pub group: Option<String>,
    pub model: Option<String>,
}

/// GET /api/v1/commands
///
/// List dispatched commands, newest first
pub async fn list_commands(
    State(state): State<ApiState>,
    Query(query): Query<CommandQuery>,
) -> ApiResult<Json<Value>> {
    let commands = state.store.list_commands(query.device.as_deref()).await?;

    Ok(Json(json!({
        "commands": commands,
        "count": commands.len(),
    })))
}

/// POST /api/v1/devices/:mac/config
pub async fn push_config(
    State(state): State<ApiState>,
    Path(mac): Path<String>,
    Json(body): Json<ConfigPushBody>,
) -> ApiResult<impl IntoResponse> {
    let correlation_id = dispatch_to(
        &state,
        &mac,
        DispatchRequest::ConfigPush {
            content: body.content,
        },
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "config_id": correlation_id })),
    ))
}

/// POST /api/v1/devices/:mac/reboot
pub async fn reboot_device(
    State(state): State<ApiState>,
    Path(mac): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let correlation_id = dispatch_to(&state, &mac, DispatchRequest::Reboot).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "command_id": correlation_id })),
    ))
}

/// POST /api/v1/devices/:mac/upgrade
pub async fn upgrade_device(
    State(state): State<ApiState>,
    Path(mac): Path<String>,
    Json(body): Json<UpgradeBody>,
) -> ApiResult<impl IntoResponse> {
    let correlation_id = dispatch_to(
        &state,
        &mac,
        DispatchRequest::Upgrade(UpgradeSpec {
            version: body.version,
            url: body.url,
            sha256: body.sha256,
        }),
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "upgrade_id": correlation_id })),
    ))
}

/// POST /api/v1/upgrades/batch
///
/// Dispatch an upgrade to every online device matching the optional group
/// and model filters. Partial failure is reported as counts.
pub async fn batch_upgrade(
    State(state): State<ApiState>,
    Json(body): Json<BatchUpgradeBody>,
) -> ApiResult<Json<BatchOutcome>> {
    let outcome = state
        .dispatcher
        .batch_upgrade(
            UpgradeSpec {
                version: body.version,
                url: body.url,
                sha256: body.sha256,
            },
            body.group,
            body.model,
        )
        .await;

    Ok(Json(outcome))
}

async fn dispatch_to(
    state: &ApiState,
    mac: &str,
    request: DispatchRequest,
) -> ApiResult<uuid::Uuid> {
    state
        .store
        .get_device(mac)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {mac} not found")))?;

    state
        .dispatcher
        .dispatch(mac.to_string(), request)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))
}
