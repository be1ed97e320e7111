//! Tenant registry CRUD: list/get/create/update. Every other entity in
//! the system is tenant-scoped, so something has to originate a
//! `tenant_id` — this is that something.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use usagetrack_shared::{StoreError, Tenant};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_tenants(State(state): State<AppState>) -> ApiResult<Json<Vec<Tenant>>> {
    let tenants: Vec<Tenant> = sqlx::query_as("SELECT * FROM tenants ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
    Ok(Json(tenants))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<Tenant>> {
    let tenant: Tenant = sqlx::query_as("SELECT * FROM tenants WHERE tenant_id = $1")
        .bind(&tenant_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(StoreError::from_sqlx)?
        .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))?;
    Ok(Json(tenant))
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub tenant_id: String,
    pub name: String,
    pub billing_contact: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

pub async fn create_tenant(
    State(state): State<AppState>,
    Json(body): Json<CreateTenantRequest>,
) -> ApiResult<Json<Tenant>> {
    let metadata = if body.metadata.is_null() {
        serde_json::json!({})
    } else {
        body.metadata
    };

    let tenant: Tenant = sqlx::query_as(
        r#"
        INSERT INTO tenants (tenant_id, name, billing_contact, metadata)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&body.tenant_id)
    .bind(&body.name)
    .bind(&body.billing_contact)
    .bind(metadata)
    .fetch_one(&state.pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    Ok(Json(tenant))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub status: Option<String>,
    pub billing_contact: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub async fn update_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<UpdateTenantRequest>,
) -> ApiResult<Json<Tenant>> {
    let tenant: Tenant = sqlx::query_as(
        r#"
        UPDATE tenants SET
            name = COALESCE($2, name),
            status = COALESCE($3, status),
            billing_contact = COALESCE($4, billing_contact),
            metadata = COALESCE($5, metadata),
            updated_at = now()
        WHERE tenant_id = $1
        RETURNING *
        "#,
    )
    .bind(&tenant_id)
    .bind(&body.name)
    .bind(&body.status)
    .bind(&body.billing_contact)
    .bind(&body.metadata)
    .fetch_optional(&state.pool)
    .await
    .map_err(StoreError::from_sqlx)?
    .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))?;

    Ok(Json(tenant))
}
