//! `GET /api/v1/usage*` and `/api/v1/analytics/trends`: the read side of
//! the pipeline. Every handler scopes to the authenticated tenant only —
//! a caller can never query another tenant's data by passing a different
//! `tenant_id`.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use time::OffsetDateTime;
use usagetrack_billing::query::{
    self, CostBreakdown, EventFilter, EventPage, ServiceBreakdownRow, TrendMetric, TrendResult,
};
use usagetrack_shared::{AggregationPeriod, PaginatedResponse, ServiceType, UsageAggregate, UsageEvent};

use crate::auth::AuthenticatedTenant;
use crate::error::ApiResult;
use crate::state::AppState;

fn default_end() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn default_start() -> OffsetDateTime {
    default_end() - time::Duration::days(30)
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default = "default_start", with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(default = "default_end", with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub service_type: Option<ServiceType>,
    pub service_provider: Option<String>,
    pub user_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

pub async fn get_usage(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Query(params): Query<UsageQuery>,
) -> ApiResult<Json<PaginatedResponse<UsageEvent>>> {
    let filter = EventFilter {
        tenant_id: tenant.tenant_id,
        start_date: params.start_date,
        end_date: params.end_date,
        service_type: params.service_type,
        service_provider: params.service_provider,
        user_id: params.user_id,
        limit: params.limit,
        offset: params.offset,
    };

    let EventPage {
        events,
        total_count,
        has_more: _,
    } = query::get_events(&state.pool, &filter).await?;

    Ok(Json(PaginatedResponse::new(
        events,
        total_count,
        filter.limit,
        filter.offset,
    )))
}

#[derive(Debug, Deserialize)]
pub struct AggregateQuery {
    #[serde(default = "default_start", with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(default = "default_end", with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    #[serde(default = "default_period")]
    pub period: AggregationPeriod,
    pub service_type: Option<ServiceType>,
    pub service_provider: Option<String>,
    pub user_id: Option<String>,
}

fn default_period() -> AggregationPeriod {
    AggregationPeriod::Day
}

pub async fn get_usage_aggregate(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Query(params): Query<AggregateQuery>,
) -> ApiResult<Json<Vec<UsageAggregate>>> {
    let filter = EventFilter {
        tenant_id: tenant.tenant_id,
        start_date: params.start_date,
        end_date: params.end_date,
        service_type: params.service_type,
        service_provider: params.service_provider,
        user_id: params.user_id,
        limit: 0,
        offset: 0,
    };
    let aggregates = query::get_aggregates(&state.pool, &filter, params.period).await?;
    Ok(Json(aggregates))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    #[serde(default = "default_start", with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(default = "default_end", with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
}

pub async fn get_usage_by_service(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Query(params): Query<RangeQuery>,
) -> ApiResult<Json<Vec<ServiceBreakdownRow>>> {
    let rows = query::get_by_service(
        &state.pool,
        &tenant.tenant_id,
        params.start_date,
        params.end_date,
    )
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct CostsQuery {
    #[serde(default = "default_start", with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(default = "default_end", with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    #[serde(default = "default_period")]
    pub group_by: AggregationPeriod,
}

pub async fn get_usage_costs(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Query(params): Query<CostsQuery>,
) -> ApiResult<Json<CostBreakdown>> {
    let breakdown = query::get_costs(
        &state.pool,
        &tenant.tenant_id,
        params.start_date,
        params.end_date,
        params.group_by,
    )
    .await?;
    Ok(Json(breakdown))
}

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    #[serde(default = "default_start", with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(default = "default_end", with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    #[serde(default = "default_period")]
    pub period: AggregationPeriod,
    #[serde(default = "default_metric")]
    pub metric: TrendMetric,
}

fn default_metric() -> TrendMetric {
    TrendMetric::TotalCost
}

pub async fn get_analytics_trends(
    State(state): State<AppState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Query(params): Query<TrendsQuery>,
) -> ApiResult<Json<TrendResult>> {
    let trend = query::get_trends(
        &state.pool,
        &tenant.tenant_id,
        params.period,
        params.metric,
        params.start_date,
        params.end_date,
    )
    .await?;
    Ok(Json(trend))
}
