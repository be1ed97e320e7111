//! Alert configuration CRUD plus instance listing/acknowledgement. This
//! module only manages configuration rows and existing instance records;
//! it does not evaluate thresholds against aggregated usage itself, and
//! delivery (webhook/email/Slack) is out of scope — an instance is a
//! durable row a caller polls or lists.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use usagetrack_shared::{AlertConfiguration, AlertInstance, AlertType, ServiceType, StoreError};
use uuid::Uuid;

use crate::auth::AuthenticatedTenant;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_alert_configurations(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
) -> ApiResult<Json<Vec<AlertConfiguration>>> {
    let rows: Vec<AlertConfiguration> = sqlx::query_as(
        "SELECT * FROM alert_configurations WHERE tenant_id = $1 ORDER BY created_at DESC",
    )
    .bind(&tenant.tenant_id)
    .fetch_all(&state.pool)
    .await
    .map_err(StoreError::from_sqlx)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct CreateAlertConfigurationRequest {
    pub alert_type: AlertType,
    pub threshold: rust_decimal::Decimal,
    pub operator: String,
    pub time_window_secs: i32,
    pub service_type: Option<ServiceType>,
    pub service_provider: Option<String>,
}

pub async fn create_alert_configuration(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Json(body): Json<CreateAlertConfigurationRequest>,
) -> ApiResult<Json<AlertConfiguration>> {
    if !["gt", "gte", "lt", "lte"].contains(&body.operator.as_str()) {
        return Err(crate::error::ApiError::BadRequest(
            "operator must be one of gt, gte, lt, lte".to_string(),
        ));
    }

    let row: AlertConfiguration = sqlx::query_as(
        r#"
        INSERT INTO alert_configurations (
            tenant_id, alert_type, threshold, operator, time_window_secs,
            service_type, service_provider
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&tenant.tenant_id)
    .bind(body.alert_type)
    .bind(body.threshold)
    .bind(&body.operator)
    .bind(body.time_window_secs)
    .bind(body.service_type)
    .bind(&body.service_provider)
    .fetch_one(&state.pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    Ok(Json(row))
}

pub async fn list_alert_instances(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
) -> ApiResult<Json<Vec<AlertInstance>>> {
    let rows: Vec<AlertInstance> = sqlx::query_as(
        "SELECT * FROM alert_instances WHERE tenant_id = $1 ORDER BY triggered_at DESC LIMIT 100",
    )
    .bind(&tenant.tenant_id)
    .fetch_all(&state.pool)
    .await
    .map_err(StoreError::from_sqlx)?;
    Ok(Json(rows))
}

pub async fn acknowledge_alert_instance(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AlertInstance>> {
    let row: AlertInstance = sqlx::query_as(
        r#"
        UPDATE alert_instances SET status = 'acknowledged', acknowledged_at = now(), updated_at = now()
        WHERE id = $1 AND tenant_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&tenant.tenant_id)
    .fetch_optional(&state.pool)
    .await
    .map_err(StoreError::from_sqlx)?
    .ok_or_else(|| StoreError::NotFound(format!("alert instance {id}")))?;

    Ok(Json(row))
}
