//! Billing rule CRUD: list/get/create, so pricing rules can be managed
//! without direct database access. Rules are immutable once created —
//! superseding a rate means inserting a new rule with a later
//! `effective_from`, not editing an old one (the pricing engine always
//! selects the most specific, most recent applicable rule).

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use time::OffsetDateTime;
use usagetrack_shared::{BillingRule, BillingUnit, CalculationMethod, ServiceType, StoreError};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BillingRuleFilter {
    pub service_type: Option<ServiceType>,
    pub service_provider: Option<String>,
}

pub async fn list_billing_rules(
    State(state): State<AppState>,
    axum::extract::Query(filter): axum::extract::Query<BillingRuleFilter>,
) -> ApiResult<Json<Vec<BillingRule>>> {
    let rows: Vec<BillingRule> = sqlx::query_as(
        r#"
        SELECT * FROM billing_rules
        WHERE ($1::VARCHAR IS NULL OR service_type = $1)
          AND ($2::VARCHAR IS NULL OR service_provider = $2)
        ORDER BY service_type, service_provider, effective_from DESC
        "#,
    )
    .bind(filter.service_type)
    .bind(&filter.service_provider)
    .fetch_all(&state.pool)
    .await
    .map_err(StoreError::from_sqlx)?;
    Ok(Json(rows))
}

pub async fn get_billing_rule(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> ApiResult<Json<BillingRule>> {
    let row: BillingRule = sqlx::query_as("SELECT * FROM billing_rules WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await
        .map_err(StoreError::from_sqlx)?
        .ok_or_else(|| StoreError::NotFound(format!("billing rule {id}")))?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct CreateBillingRuleRequest {
    pub service_type: ServiceType,
    pub service_provider: String,
    pub model_or_tier: Option<String>,
    pub billing_unit: BillingUnit,
    pub rate_per_unit: rust_decimal::Decimal,
    pub tiered_rates: Option<serde_json::Value>,
    pub minimum_charge: Option<rust_decimal::Decimal>,
    #[serde(default = "default_calculation_method")]
    pub calculation_method: CalculationMethod,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub effective_from: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub effective_until: Option<OffsetDateTime>,
}

fn default_calculation_method() -> CalculationMethod {
    CalculationMethod::Multiply
}

pub async fn create_billing_rule(
    State(state): State<AppState>,
    Json(body): Json<CreateBillingRuleRequest>,
) -> ApiResult<Json<BillingRule>> {
    let row: BillingRule = sqlx::query_as(
        r#"
        INSERT INTO billing_rules (
            service_type, service_provider, model_or_tier, billing_unit, rate_per_unit,
            tiered_rates, minimum_charge, calculation_method, effective_from, effective_until
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(body.service_type)
    .bind(&body.service_provider)
    .bind(&body.model_or_tier)
    .bind(body.billing_unit)
    .bind(body.rate_per_unit)
    .bind(&body.tiered_rates)
    .bind(body.minimum_charge)
    .bind(body.calculation_method)
    .bind(body.effective_from)
    .bind(body.effective_until)
    .fetch_one(&state.pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    Ok(Json(row))
}
