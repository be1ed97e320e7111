//! API key authentication: key issuance/validation, plus the axum
//! middleware that resolves a request's tenant from its `X-API-Key` /
//! `Authorization: Bearer` header.

mod api_key;

pub use api_key::{ApiKeyError, ApiKeyManager};

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Paths that bypass authentication entirely.
const PUBLIC_PATHS: &[&str] = &["/health", "/health/live", "/health/ready"];

/// The tenant resolved from a valid API key, attached to request
/// extensions for downstream handlers via [`axum::extract::Extension`].
#[derive(Debug, Clone)]
pub struct AuthenticatedTenant {
    pub tenant_id: String,
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let raw_key = extract_key(&request).ok_or(ApiError::AuthRequired)?;

    let tenant_id = resolve_tenant(&state, &raw_key).await?;
    request
        .extensions_mut()
        .insert(AuthenticatedTenant { tenant_id });

    Ok(next.run(request).await)
}

fn extract_key(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get("X-API-Key") {
        return value.to_str().ok().map(str::to_string);
    }
    let auth = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ").map(str::to_string)
}

async fn resolve_tenant(state: &AppState, raw_key: &str) -> Result<String, ApiError> {
    if !state.api_key_manager.validate_key(raw_key).map_err(|_| ApiError::InvalidApiKey)? {
        return Err(ApiError::InvalidApiKey);
    }

    let key_hash = state.api_key_manager.hash_key(raw_key);
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT tenant_id FROM api_keys WHERE key_hash = $1 AND is_active = true AND revoked_at IS NULL",
    )
    .bind(&key_hash)
    .fetch_optional(&state.pool)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;

    let (tenant_id,) = row.ok_or(ApiError::InvalidApiKey)?;

    let _ = sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE key_hash = $1")
        .bind(&key_hash)
        .execute(&state.pool)
        .await;

    Ok(tenant_id)
}
