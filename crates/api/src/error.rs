//! HTTP-facing error type. Maps every lower-level error into the status
//! codes and body shape the ingest/query surface promises.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use usagetrack_billing::BillingError;
use usagetrack_queue::QueueError;
use usagetrack_shared::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    AuthRequired,

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("validation failed")]
    Validation(Vec<usagetrack_billing::FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Conflict(msg) => ApiError::BadRequest(msg),
            StoreError::Database(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(fields) => ApiError::Validation(fields),
            BillingError::NoApplicableRule { .. } => ApiError::BadRequest(err.to_string()),
            BillingError::Store(store_err) => store_err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::AuthRequired => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "authentication_required", "message": self.to_string()}),
            ),
            ApiError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "invalid_api_key", "message": self.to_string()}),
            ),
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "validation", "field_errors": fields}),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, json!({"error": "bad_request", "message": msg}))
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, json!({"error": "not_found", "message": msg}))
            }
            ApiError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({"error": "rate_limited", "message": self.to_string()}),
            ),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": "service_unavailable", "message": self.to_string()}),
            ),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "unhandled internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal", "message": "an internal error occurred"}),
                )
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
