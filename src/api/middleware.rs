//! Admission control middleware
//!
//! One token bucket per client source address; requests that find an empty
//! bucket are rejected with 429 before reaching any handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::error::ApiError;
use crate::limiter::RateLimiter;

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let client = addr.ip().to_string();

    if !limiter.allow(&client).await {
        debug!("rate limit exceeded for {client}");
        return ApiError::TooManyRequests.into_response();
    }

    next.run(request).await
}
