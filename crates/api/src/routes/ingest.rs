//! `POST /api/v1/events` and `/api/v1/events/batch`: validate then hand
//! off to the queue. Pricing and persistence happen downstream in the
//! worker, not on the request path.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::json;
use usagetrack_billing::validate;
use usagetrack_shared::{BatchIngestResponse, FailedEvent, IngestResponse, RawEvent};

use crate::auth::AuthenticatedTenant;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Persist a normalized event directly, bypassing the queue. Used only
/// when the queue is unreachable, so an ingest outage never means data
/// loss for the caller. The event lands with `status = 'pending'`,
/// exactly as it would after a normal enqueue-then-dequeue trip, so the
/// worker's usual pricing/completion pass still runs over it later.
async fn store_directly(
    state: &AppState,
    tenant_id: &str,
    raw: &RawEvent,
    normalized: &usagetrack_shared::NormalizedEvent,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO usage_events (
            event_id, tenant_id, timestamp, user_id, service_type, service_provider,
            event_type, metrics, metadata, tags, billing_info, total_cost, status,
            session_id, request_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, 'pending', $12, $13)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(normalized.event_id)
    .bind(tenant_id)
    .bind(normalized.timestamp)
    .bind(&normalized.user_id)
    .bind(normalized.service_type)
    .bind(&normalized.service_provider)
    .bind(&normalized.event_type)
    .bind(serde_json::to_value(&normalized.metrics).unwrap_or_default())
    .bind(serde_json::to_value(&normalized.metadata).unwrap_or_default())
    .bind(&raw.tags)
    .bind(json!({}))
    .bind(&normalized.session_id)
    .bind(&normalized.request_id)
    .execute(&state.pool)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(())
}

async fn enqueue_or_store(
    state: &AppState,
    tenant_id: &str,
    mut raw: RawEvent,
) -> ApiResult<uuid::Uuid> {
    raw.tenant_id = Some(tenant_id.to_string());
    let normalized = validate(raw.clone())?;

    let payload = serde_json::to_string(&normalized).map_err(|e| ApiError::Internal(e.into()))?;
    match state.queue.push(&state.config.queue_name, &payload).await {
        Ok(()) => {}
        Err(err) => {
            tracing::warn!(error = %err, "queue push failed, falling back to direct store write");
            store_directly(state, tenant_id, &raw, &normalized).await?;
        }
    }

    Ok(normalized.event_id)
}

pub async fn ingest_event(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Json(raw): Json<RawEvent>,
) -> ApiResult<Json<IngestResponse>> {
    let event_id = enqueue_or_store(&state, &tenant.tenant_id, raw).await?;
    Ok(Json(IngestResponse {
        success: true,
        event_id,
        message: "event accepted".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BatchIngestRequest {
    pub events: Vec<RawEvent>,
}

pub async fn ingest_batch(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Json(body): Json<BatchIngestRequest>,
) -> ApiResult<Json<BatchIngestResponse>> {
    if body.events.len() > state.config.max_batch_size {
        return Err(ApiError::BadRequest(format!(
            "batch size {} exceeds max_batch_size {}",
            body.events.len(),
            state.config.max_batch_size
        )));
    }

    let mut failed_events = Vec::new();
    let mut processed_count = 0usize;

    for (index, raw) in body.events.into_iter().enumerate() {
        let event_data = serde_json::to_value(&raw).unwrap_or_default();
        match enqueue_or_store(&state, &tenant.tenant_id, raw).await {
            Ok(_) => processed_count += 1,
            Err(err) => failed_events.push(FailedEvent {
                index,
                error: err.to_string(),
                event_data,
            }),
        }
    }

    let failed_count = failed_events.len();
    Ok(Json(BatchIngestResponse {
        processed_count,
        failed_count,
        failed_events,
        message: format!("{processed_count} accepted, {failed_count} rejected"),
    }))
}
