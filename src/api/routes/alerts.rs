//! Alert listing endpoint

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{error::ApiResult, state::ApiState};

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Filter by resolved flag; absent returns everything
    resolved: Option<bool>,
}

/// GET /api/v1/alerts
///
/// List alerts, newest first
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertQuery>,
) -> ApiResult<Json<Value>> {
    let alerts = state.store.list_alerts(query.resolved).await?;

    Ok(Json(json!({
        "alerts": alerts,
        "count": alerts.len(),
    })))
}
