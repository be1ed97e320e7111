//! Query service: the persistence-layer queries behind the read API
//! (filtered event listing, aggregate reads, breakdowns, trend analysis).
//! HTTP-specific concerns (caching, request parsing) live in the `api`
//! crate; this module only touches `PgPool`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use usagetrack_shared::{AggregationPeriod, ServiceType, StoreError, UsageAggregate, UsageEvent};

/// Filters shared by `get_events` and `get_aggregates`.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub tenant_id: String,
    pub start_date: OffsetDateTime,
    pub end_date: OffsetDateTime,
    pub service_type: Option<ServiceType>,
    pub service_provider: Option<String>,
    pub user_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl EventFilter {
    /// A filter defaulting to the last 30 days, matching the query
    /// service's default window when `start_date`/`end_date` are absent.
    pub fn last_30_days(tenant_id: impl Into<String>) -> Self {
        let end_date = OffsetDateTime::now_utc();
        Self {
            tenant_id: tenant_id.into(),
            start_date: end_date - time::Duration::days(30),
            end_date,
            service_type: None,
            service_provider: None,
            user_id: None,
            limit: 100,
            offset: 0,
        }
    }
}

pub struct EventPage {
    pub events: Vec<UsageEvent>,
    pub total_count: i64,
    pub has_more: bool,
}

/// `GET /api/v1/usage`: events sorted by `timestamp` descending.
pub async fn get_events(pool: &PgPool, filter: &EventFilter) -> Result<EventPage, StoreError> {
    let total_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)::BIGINT FROM usage_events
        WHERE tenant_id = $1
          AND timestamp >= $2 AND timestamp < $3
          AND ($4::VARCHAR IS NULL OR service_type = $4)
          AND ($5::VARCHAR IS NULL OR service_provider = $5)
          AND ($6::VARCHAR IS NULL OR user_id = $6)
        "#,
    )
    .bind(&filter.tenant_id)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .bind(filter.service_type)
    .bind(&filter.service_provider)
    .bind(&filter.user_id)
    .fetch_one(pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    let events: Vec<UsageEvent> = sqlx::query_as(
        r#"
        SELECT * FROM usage_events
        WHERE tenant_id = $1
          AND timestamp >= $2 AND timestamp < $3
          AND ($4::VARCHAR IS NULL OR service_type = $4)
          AND ($5::VARCHAR IS NULL OR service_provider = $5)
          AND ($6::VARCHAR IS NULL OR user_id = $6)
        ORDER BY timestamp DESC
        LIMIT $7 OFFSET $8
        "#,
    )
    .bind(&filter.tenant_id)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .bind(filter.service_type)
    .bind(&filter.service_provider)
    .bind(&filter.user_id)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    let has_more = filter.offset + (events.len() as i64) < total_count;
    Ok(EventPage {
        events,
        total_count,
        has_more,
    })
}

/// `GET /api/v1/usage/aggregate`: reads persisted rollups rather than
/// recomputing from raw events. Callers are expected to cache the result
/// for 5 minutes, per the query service's cache policy.
pub async fn get_aggregates(
    pool: &PgPool,
    filter: &EventFilter,
    period: AggregationPeriod,
) -> Result<Vec<UsageAggregate>, StoreError> {
    sqlx::query_as(
        r#"
        SELECT * FROM usage_aggregates
        WHERE tenant_id = $1
          AND period_type = $2
          AND period_start >= $3 AND period_start < $4
          AND ($5::VARCHAR IS NULL OR service_type = $5)
          AND ($6::VARCHAR IS NULL OR service_provider = $6)
          AND ($7::VARCHAR IS NULL OR user_id = $7)
        ORDER BY period_start ASC
        "#,
    )
    .bind(&filter.tenant_id)
    .bind(period)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .bind(filter.service_type)
    .bind(&filter.service_provider)
    .bind(&filter.user_id)
    .fetch_all(pool)
    .await
    .map_err(StoreError::from_sqlx)
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceBreakdownRow {
    pub service_type: ServiceType,
    pub service_provider: String,
    pub event_count: i64,
    pub total_cost: Decimal,
    pub percentage_of_total: Decimal,
}

/// `GET /api/v1/usage/by-service`: groups by `(service_type,
/// service_provider)`, sorted by event count descending.
pub async fn get_by_service(
    pool: &PgPool,
    tenant_id: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<ServiceBreakdownRow>, StoreError> {
    let rows: Vec<(ServiceType, String, i64, Decimal)> = sqlx::query_as(
        r#"
        SELECT service_type, service_provider, COUNT(*)::BIGINT, COALESCE(SUM(total_cost), 0)
        FROM usage_events
        WHERE tenant_id = $1 AND timestamp >= $2 AND timestamp < $3
        GROUP BY service_type, service_provider
        ORDER BY COUNT(*) DESC
        "#,
    )
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    let total: i64 = rows.iter().map(|(_, _, count, _)| count).sum();

    Ok(rows
        .into_iter()
        .map(|(service_type, service_provider, event_count, total_cost)| {
            let percentage_of_total = if total > 0 {
                (Decimal::from(event_count) / Decimal::from(total) * Decimal::from(100)).round_dp(4)
            } else {
                Decimal::ZERO
            };
            ServiceBreakdownRow {
                service_type,
                service_provider,
                event_count,
                total_cost,
                percentage_of_total,
            }
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct CostBreakdown {
    pub total_cost: Decimal,
    pub cost_by_service: serde_json::Value,
    pub cost_by_period: Vec<CostByPeriodRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostByPeriodRow {
    pub period_start: OffsetDateTime,
    pub total_cost: Decimal,
}

/// `GET /api/v1/usage/costs`: `group_by` selects the `date_trunc` unit
/// used for `cost_by_period`.
pub async fn get_costs(
    pool: &PgPool,
    tenant_id: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
    group_by: AggregationPeriod,
) -> Result<CostBreakdown, StoreError> {
    let total_cost: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_cost), 0) FROM usage_events \
         WHERE tenant_id = $1 AND timestamp >= $2 AND timestamp < $3",
    )
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    let by_service: Vec<(ServiceType, String, Decimal)> = sqlx::query_as(
        r#"
        SELECT service_type, service_provider, COALESCE(SUM(total_cost), 0)
        FROM usage_events
        WHERE tenant_id = $1 AND timestamp >= $2 AND timestamp < $3
        GROUP BY service_type, service_provider
        "#,
    )
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    let mut cost_by_service = serde_json::Map::new();
    for (service_type, provider, cost) in by_service {
        let key = format!("{}:{}", service_type_trunc_key(service_type), provider);
        cost_by_service.insert(key, serde_json::json!(cost));
    }

    let unit = date_trunc_unit(group_by);
    let by_period: Vec<(OffsetDateTime, Decimal)> = sqlx::query_as(&format!(
        r#"
        SELECT date_trunc('{unit}', timestamp) AS bucket, COALESCE(SUM(total_cost), 0)
        FROM usage_events
        WHERE tenant_id = $1 AND timestamp >= $2 AND timestamp < $3
        GROUP BY bucket
        ORDER BY bucket ASC
        "#
    ))
    .bind(tenant_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    Ok(CostBreakdown {
        total_cost,
        cost_by_service: serde_json::Value::Object(cost_by_service),
        cost_by_period: by_period
            .into_iter()
            .map(|(period_start, total_cost)| CostByPeriodRow {
                period_start,
                total_cost,
            })
            .collect(),
    })
}

fn date_trunc_unit(period: AggregationPeriod) -> &'static str {
    match period {
        AggregationPeriod::Hour => "hour",
        AggregationPeriod::Day => "day",
        AggregationPeriod::Week => "week",
        AggregationPeriod::Month => "month",
    }
}

fn service_type_trunc_key(service_type: ServiceType) -> &'static str {
    match service_type {
        ServiceType::LlmService => "llm_service",
        ServiceType::DocumentProcessor => "document_processor",
        ServiceType::ApiService => "api_service",
        ServiceType::Custom => "custom",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    EventCount,
    TotalCost,
    UniqueUsers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendResult {
    pub direction: TrendDirection,
    pub percentage_change: Decimal,
    pub series: Vec<(OffsetDateTime, Decimal)>,
}

/// `GET /api/v1/analytics/trends`: reads the overall-dimension aggregate
/// series for `period`/`metric`, then compares the first-half mean to the
/// second-half mean with a ±5% dead band.
pub async fn get_trends(
    pool: &PgPool,
    tenant_id: &str,
    period: AggregationPeriod,
    metric: TrendMetric,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<TrendResult, StoreError> {
    let column = match metric {
        TrendMetric::EventCount => "event_count",
        TrendMetric::TotalCost => "total_cost",
        TrendMetric::UniqueUsers => "unique_users",
    };

    let rows: Vec<(OffsetDateTime, Decimal)> = sqlx::query_as(&format!(
        r#"
        SELECT period_start, {column}::NUMERIC
        FROM usage_aggregates
        WHERE tenant_id = $1 AND period_type = $2
          AND service_type IS NULL AND service_provider IS NULL AND user_id IS NULL
          AND period_start >= $3 AND period_start < $4
        ORDER BY period_start ASC
        "#
    ))
    .bind(tenant_id)
    .bind(period)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    Ok(compute_trend(rows))
}

/// Pure trend computation over an ordered `(period_start, value)` series,
/// split into rows for testability.
fn compute_trend(series: Vec<(OffsetDateTime, Decimal)>) -> TrendResult {
    if series.len() < 2 {
        return TrendResult {
            direction: TrendDirection::Stable,
            percentage_change: Decimal::ZERO,
            series,
        };
    }

    let midpoint = series.len() / 2;
    let first_half = mean(&series[..midpoint]);
    let second_half = mean(&series[midpoint..]);

    let percentage_change = if first_half != Decimal::ZERO {
        ((second_half - first_half) / first_half * Decimal::from(100)).round_dp(4)
    } else {
        Decimal::ZERO
    };

    // +/- 5% counts as stable rather than a genuine trend.
    let dead_band = Decimal::new(5, 0);
    let direction = if percentage_change > dead_band {
        TrendDirection::Increasing
    } else if percentage_change < -dead_band {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    TrendResult {
        direction,
        percentage_change,
        series,
    }
}

fn mean(values: &[(OffsetDateTime, Decimal)]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = values.iter().map(|(_, v)| *v).sum();
    sum / Decimal::from(values.len())
}
