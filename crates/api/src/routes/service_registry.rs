//! Service registry CRUD: each `ServiceType` has one registry row
//! describing its known providers and the fields ingest validation
//! expects, kept in the database rather than compiled in so a new
//! provider can be added without a deploy.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use usagetrack_shared::{ServiceRegistry, ServiceType, StoreError};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_service_registries(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ServiceRegistry>>> {
    let rows: Vec<ServiceRegistry> =
        sqlx::query_as("SELECT * FROM service_registries ORDER BY service_type")
            .fetch_all(&state.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
    Ok(Json(rows))
}

pub async fn get_service_registry(
    State(state): State<AppState>,
    Path(service_type): Path<ServiceType>,
) -> ApiResult<Json<ServiceRegistry>> {
    let row: ServiceRegistry =
        sqlx::query_as("SELECT * FROM service_registries WHERE service_type = $1")
            .bind(service_type)
            .fetch_optional(&state.pool)
            .await
            .map_err(StoreError::from_sqlx)?
            .ok_or_else(|| StoreError::NotFound(format!("service registry {service_type:?}")))?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct UpsertServiceRegistryRequest {
    pub service_type: ServiceType,
    #[serde(default)]
    pub providers: serde_json::Value,
    #[serde(default)]
    pub required_fields: serde_json::Value,
    #[serde(default)]
    pub optional_fields: serde_json::Value,
    #[serde(default)]
    pub billing_config: serde_json::Value,
}

pub async fn create_service_registry(
    State(state): State<AppState>,
    Json(body): Json<UpsertServiceRegistryRequest>,
) -> ApiResult<Json<ServiceRegistry>> {
    let row: ServiceRegistry = sqlx::query_as(
        r#"
        INSERT INTO service_registries (
            service_type, providers, required_fields, optional_fields, billing_config
        ) VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (service_type) DO UPDATE SET
            providers = EXCLUDED.providers,
            required_fields = EXCLUDED.required_fields,
            optional_fields = EXCLUDED.optional_fields,
            billing_config = EXCLUDED.billing_config,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(body.service_type)
    .bind(default_array(body.providers))
    .bind(default_array(body.required_fields))
    .bind(default_array(body.optional_fields))
    .bind(default_object(body.billing_config))
    .fetch_one(&state.pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    Ok(Json(row))
}

pub async fn update_service_registry(
    State(state): State<AppState>,
    Path(service_type): Path<ServiceType>,
    Json(mut body): Json<UpsertServiceRegistryRequest>,
) -> ApiResult<Json<ServiceRegistry>> {
    body.service_type = service_type;
    create_service_registry(State(state), Json(body)).await
}

fn default_array(value: serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        serde_json::json!([])
    } else {
        value
    }
}

fn default_object(value: serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        serde_json::json!({})
    } else {
        value
    }
}
