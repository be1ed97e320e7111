//! Rate-limiting middleware: fixed-window per `(tenant_id, client_ip)`,
//! applied after authentication so an anonymous caller and an
//! authenticated tenant never share a bucket.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use usagetrack_shared::rate_limit_key;

use crate::auth::AuthenticatedTenant;
use crate::error::ApiError;
use crate::state::AppState;

const PUBLIC_PATHS: &[&str] = &["/health", "/health/live", "/health/ready"];

pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let tenant_id = request
        .extensions()
        .get::<AuthenticatedTenant>()
        .map(|t| t.tenant_id.as_str());
    let client_ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let key = rate_limit_key(tenant_id, &client_ip);
    let limit = state.config.rate_limit_requests_per_minute;

    let decision = state
        .rate_limiter
        .check(&key, limit)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    if !decision.allowed {
        return Err(ApiError::RateLimited {
            retry_after_secs: decision.reset_after_secs,
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_after_secs.to_string()) {
        headers.insert("X-RateLimit-Reset", value);
    }

    Ok(response)
}
