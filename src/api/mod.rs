//! REST API and WebSocket server for the fleet control-plane
//!
//! HTTP endpoints for querying devices, metric history, alerts and command
//! records, POST endpoints for dispatching commands, plus a WebSocket feed
//! of live fleet events.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/devices` - List registered devices
//! - `GET /api/v1/devices/{mac}` - One device
//! - `GET /api/v1/devices/{mac}/metrics` - Metric history for one device
//! - `GET /api/v1/alerts` - List alerts (filter with `?resolved=`)
//! - `GET /api/v1/commands` - List dispatched commands (filter with `?device=`)
//! - `POST /api/v1/devices/{mac}/config` - Push a configuration
//! - `POST /api/v1/devices/{mac}/reboot` - Request a reboot
//! - `POST /api/v1/devices/{mac}/upgrade` - Request a firmware upgrade
//! - `POST /api/v1/upgrades/batch` - Upgrade every matching online device
//! - `WS /ws` - Real-time event stream

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tracing::info;

use crate::config::ApiConfig;

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind_addr);

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/devices", get(routes::devices::list_devices))
        .route("/api/v1/devices/:mac", get(routes::devices::get_device))
        .route(
            "/api/v1/devices/:mac/metrics",
            get(routes::devices::get_device_metrics),
        )
        .route("/api/v1/alerts", get(routes::alerts::list_alerts))
        .route("/api/v1/commands", get(routes::commands::list_commands))
        .route(
            "/api/v1/devices/:mac/config",
            post(routes::commands::push_config),
        )
        .route(
            "/api/v1/devices/:mac/reboot",
            post(routes::commands::reboot_device),
        )
        .route(
            "/api/v1/devices/:mac/upgrade",
            post(routes::commands::upgrade_device),
        )
        .route(
            "/api/v1/upgrades/batch",
            post(routes::commands::batch_upgrade),
        )
        .route("/ws", get(websocket::websocket_handler));

    // Admission control sits in front of every route; without a configured
    // limiter requests pass straight through.
    if let Some(limiter) = state.limiter.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    let mut app = app.with_state(state).layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
