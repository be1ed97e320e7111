//! Aggregation engine: periodic roll-up of `usage_events` into
//! `usage_aggregates`, followed by the monthly billing summary pass.

use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use time::{Duration, Month, OffsetDateTime, Time};
use usagetrack_shared::{AggregationPeriod, ServiceType, StoreError};

/// The four period kinds the engine tiles each cycle, paired with how far
/// back their replay window reaches.
fn replay_windows() -> [(AggregationPeriod, Duration); 4] {
    [
        (AggregationPeriod::Hour, Duration::hours(25)),
        (AggregationPeriod::Day, Duration::days(8)),
        (AggregationPeriod::Week, Duration::weeks(5)),
        (AggregationPeriod::Month, Duration::days(395)),
    ]
}

pub struct AggregationEngine {
    pool: PgPool,
}

impl AggregationEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run one full cycle: four period replays, then the billing summary
    /// pass, anchored at `now`.
    pub async fn run_cycle(&self, now: OffsetDateTime) -> Result<(), StoreError> {
        for (period, window) in replay_windows() {
            self.replay_period(period, window, now).await?;
        }
        self.run_billing_summary_pass(now).await?;
        Ok(())
    }

    async fn replay_period(
        &self,
        period: AggregationPeriod,
        window: Duration,
        now: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let window_start = align_down(now - window, period);
        let tenants = self.distinct_tenants(window_start, now).await?;

        for tenant_id in tenants {
            let mut cursor = window_start;
            while cursor < now {
                let period_end = step(cursor, period);
                self.upsert_period(&tenant_id, period, cursor, period_end).await?;
                cursor = period_end;
            }
        }
        Ok(())
    }

    async fn distinct_tenants(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT tenant_id FROM usage_events \
             WHERE status = 'completed' AND timestamp >= $1 AND timestamp < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    async fn upsert_period(
        &self,
        tenant_id: &str,
        period: AggregationPeriod,
        period_start: OffsetDateTime,
        period_end: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.upsert_dimension(tenant_id, period, period_start, period_end, None, None, None)
            .await?;

        let service_types = self
            .distinct_service_types(tenant_id, period_start, period_end)
            .await?;
        for service_type in &service_types {
            self.upsert_dimension(
                tenant_id,
                period,
                period_start,
                period_end,
                Some(*service_type),
                None,
                None,
            )
            .await?;

            let providers = self
                .distinct_providers(tenant_id, *service_type, period_start, period_end)
                .await?;
            for provider in &providers {
                self.upsert_dimension(
                    tenant_id,
                    period,
                    period_start,
                    period_end,
                    Some(*service_type),
                    Some(provider.as_str()),
                    None,
                )
                .await?;
            }
        }

        for user_id in self.top_users(tenant_id, period_start, period_end, 100).await? {
            self.upsert_dimension(
                tenant_id,
                period,
                period_start,
                period_end,
                None,
                None,
                Some(user_id.as_str()),
            )
            .await?;
        }

        Ok(())
    }

    async fn distinct_service_types(
        &self,
        tenant_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ServiceType>, StoreError> {
        let rows: Vec<(ServiceType,)> = sqlx::query_as(
            "SELECT DISTINCT service_type FROM usage_events \
             WHERE tenant_id = $1 AND timestamp >= $2 AND timestamp < $3",
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    async fn distinct_providers(
        &self,
        tenant_id: &str,
        service_type: ServiceType,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT service_provider FROM usage_events \
             WHERE tenant_id = $1 AND service_type = $2 AND timestamp >= $3 AND timestamp < $4",
        )
        .bind(tenant_id)
        .bind(service_type)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    /// Top 100 users by event count, bounding per-period row count.
    async fn top_users(
        &self,
        tenant_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM usage_events
            WHERE tenant_id = $1 AND timestamp >= $2 AND timestamp < $3
            GROUP BY user_id
            ORDER BY COUNT(*) DESC
            LIMIT $4
            "#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(rows.into_iter().map(|(u,)| u).collect())
    }

    #[allow(clippy::too_many_arguments)]
    async fn upsert_dimension(
        &self,
        tenant_id: &str,
        period: AggregationPeriod,
        period_start: OffsetDateTime,
        period_end: OffsetDateTime,
        service_type: Option<ServiceType>,
        service_provider: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let metrics = self
            .dimension_metrics(tenant_id, period_start, period_end, service_type, service_provider, user_id)
            .await?;
        if metrics.event_count == 0 {
            return Ok(());
        }

        let aggregated_metrics = match (service_type, service_provider, user_id) {
            (Some(service_type), None, None) => {
                self.service_specific_metrics(tenant_id, service_type, period_start, period_end)
                    .await?
            }
            _ => json!({}),
        };

        sqlx::query(
            r#"
            INSERT INTO usage_aggregates (
                tenant_id, period_start, period_end, period_type,
                service_type, service_provider, user_id,
                event_count, unique_users, error_count, total_cost, error_rate,
                avg_latency_ms, p95_latency_ms, aggregated_metrics
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (
                tenant_id, period_start, period_type,
                COALESCE(service_type, ''), COALESCE(service_provider, ''), COALESCE(user_id, '')
            )
            DO UPDATE SET
                period_end = EXCLUDED.period_end,
                event_count = EXCLUDED.event_count,
                unique_users = EXCLUDED.unique_users,
                error_count = EXCLUDED.error_count,
                total_cost = EXCLUDED.total_cost,
                error_rate = EXCLUDED.error_rate,
                avg_latency_ms = EXCLUDED.avg_latency_ms,
                p95_latency_ms = EXCLUDED.p95_latency_ms,
                aggregated_metrics = EXCLUDED.aggregated_metrics,
                updated_at = now()
            "#,
        )
        .bind(tenant_id)
        .bind(period_start)
        .bind(period_end)
        .bind(period)
        .bind(service_type)
        .bind(service_provider)
        .bind(user_id)
        .bind(metrics.event_count)
        .bind(metrics.unique_users)
        .bind(metrics.error_count)
        .bind(metrics.total_cost)
        .bind(metrics.error_rate)
        .bind(metrics.avg_latency_ms)
        .bind(metrics.p95_latency_ms)
        .bind(aggregated_metrics)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn dimension_metrics(
        &self,
        tenant_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
        service_type: Option<ServiceType>,
        service_provider: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<DimensionMetrics, StoreError> {
        let row: (i64, i64, i64, Decimal, Option<Decimal>, Option<Decimal>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*)::BIGINT,
                COUNT(DISTINCT user_id)::BIGINT,
                COUNT(*) FILTER (WHERE status = 'failed')::BIGINT,
                COALESCE(SUM(total_cost), 0),
                AVG((metrics->>'latency_ms')::NUMERIC),
                PERCENTILE_CONT(0.95) WITHIN GROUP (ORDER BY (metrics->>'latency_ms')::NUMERIC)
            FROM usage_events
            WHERE tenant_id = $1
              AND timestamp >= $2 AND timestamp < $3
              AND ($4::VARCHAR IS NULL OR service_type = $4)
              AND ($5::VARCHAR IS NULL OR service_provider = $5)
              AND ($6::VARCHAR IS NULL OR user_id = $6)
            "#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .bind(service_type)
        .bind(service_provider)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        let (event_count, unique_users, error_count, total_cost, avg_latency_ms, p95_latency_ms) = row;
        let error_rate = if event_count > 0 {
            (Decimal::from(error_count) / Decimal::from(event_count)).round_dp(6)
        } else {
            Decimal::ZERO
        };

        Ok(DimensionMetrics {
            event_count,
            unique_users,
            error_count,
            total_cost,
            error_rate,
            avg_latency_ms,
            p95_latency_ms,
        })
    }

    /// Service-specific sums/averages per the reference table, only
    /// computed for the per-`service_type` dimension row (not the overall
    /// or per-user rows, which mix types and can't share one schema).
    async fn service_specific_metrics(
        &self,
        tenant_id: &str,
        service_type: ServiceType,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Value, StoreError> {
        match service_type {
            ServiceType::LlmService => {
                let row: (Decimal, Decimal, Decimal, Option<Decimal>, Option<Decimal>) = sqlx::query_as(
                    r#"
                    SELECT
                        COALESCE(SUM((metrics->>'input_tokens')::NUMERIC), 0),
                        COALESCE(SUM((metrics->>'output_tokens')::NUMERIC), 0),
                        COALESCE(SUM((metrics->>'total_tokens')::NUMERIC), 0),
                        AVG((metrics->>'input_tokens')::NUMERIC),
                        AVG((metrics->>'output_tokens')::NUMERIC)
                    FROM usage_events
                    WHERE tenant_id = $1 AND service_type = $2 AND timestamp >= $3 AND timestamp < $4
                    "#,
                )
                .bind(tenant_id)
                .bind(service_type)
                .bind(start)
                .bind(end)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

                Ok(json!({
                    "total_input_tokens": row.0,
                    "total_output_tokens": row.1,
                    "total_tokens": row.2,
                    "avg_input_tokens": row.3,
                    "avg_output_tokens": row.4,
                }))
            }
            ServiceType::DocumentProcessor => {
                let row: (Decimal, Decimal, Option<Decimal>) = sqlx::query_as(
                    r#"
                    SELECT
                        COALESCE(SUM((metrics->>'pages_processed')::NUMERIC), 0),
                        COALESCE(SUM((metrics->>'characters_extracted')::NUMERIC), 0),
                        AVG((metrics->>'processing_time_ms')::NUMERIC)
                    FROM usage_events
                    WHERE tenant_id = $1 AND service_type = $2 AND timestamp >= $3 AND timestamp < $4
                    "#,
                )
                .bind(tenant_id)
                .bind(service_type)
                .bind(start)
                .bind(end)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

                Ok(json!({
                    "total_pages_processed": row.0,
                    "total_characters_extracted": row.1,
                    "avg_processing_time_ms": row.2,
                }))
            }
            ServiceType::ApiService => {
                let row: (Decimal, Decimal, Decimal, Option<Decimal>) = sqlx::query_as(
                    r#"
                    SELECT
                        COALESCE(SUM(COALESCE((metrics->>'request_count')::NUMERIC, 1)), 0),
                        COALESCE(SUM((metrics->>'payload_size_bytes')::NUMERIC), 0),
                        COALESCE(SUM((metrics->>'response_size_bytes')::NUMERIC), 0),
                        AVG((metrics->>'response_time_ms')::NUMERIC)
                    FROM usage_events
                    WHERE tenant_id = $1 AND service_type = $2 AND timestamp >= $3 AND timestamp < $4
                    "#,
                )
                .bind(tenant_id)
                .bind(service_type)
                .bind(start)
                .bind(end)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

                Ok(json!({
                    "total_requests": row.0,
                    "total_payload_bytes": row.1,
                    "total_response_bytes": row.2,
                    "avg_response_time_ms": row.3,
                }))
            }
            ServiceType::Custom => Ok(json!({})),
        }
    }

    /// For the previous and current calendar month, roll up every
    /// tenant's completed, costed events into a `billing_summaries` row.
    /// `is_finalized` rows are left untouched (an external process has
    /// sealed them).
    async fn run_billing_summary_pass(&self, now: OffsetDateTime) -> Result<(), StoreError> {
        let current_month_start = align_down(now, AggregationPeriod::Month);
        let previous_month_start = step_back_month(current_month_start);

        for month_start in [previous_month_start, current_month_start] {
            let month_end = step(month_start, AggregationPeriod::Month);
            self.upsert_billing_summary_for_month(month_start, month_end).await?;
        }
        Ok(())
    }

    async fn upsert_billing_summary_for_month(
        &self,
        month_start: OffsetDateTime,
        month_end: OffsetDateTime,
    ) -> Result<(), StoreError> {
        for tenant_id in self.distinct_tenants(month_start, month_end).await? {
            let (total_cost, total_events, active_users): (Decimal, i64, i64) = sqlx::query_as(
                r#"
                SELECT COALESCE(SUM(total_cost), 0), COUNT(*)::BIGINT, COUNT(DISTINCT user_id)::BIGINT
                FROM usage_events
                WHERE tenant_id = $1 AND status = 'completed' AND timestamp >= $2 AND timestamp < $3
                "#,
            )
            .bind(&tenant_id)
            .bind(month_start)
            .bind(month_end)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

            let cost_by_service = self.cost_by_service(&tenant_id, month_start, month_end).await?;
            let cost_by_user = self.cost_by_user(&tenant_id, month_start, month_end, 50).await?;

            sqlx::query(
                r#"
                INSERT INTO billing_summaries (
                    tenant_id, billing_period_start, billing_period_end,
                    total_cost, cost_by_service, cost_by_user, total_events, active_users
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (tenant_id, billing_period_start, billing_period_end)
                DO UPDATE SET
                    total_cost = EXCLUDED.total_cost,
                    cost_by_service = EXCLUDED.cost_by_service,
                    cost_by_user = EXCLUDED.cost_by_user,
                    total_events = EXCLUDED.total_events,
                    active_users = EXCLUDED.active_users,
                    updated_at = now()
                WHERE billing_summaries.is_finalized = false
                "#,
            )
            .bind(&tenant_id)
            .bind(month_start)
            .bind(month_end)
            .bind(total_cost)
            .bind(cost_by_service)
            .bind(cost_by_user)
            .bind(total_events)
            .bind(active_users)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        }
        Ok(())
    }

    async fn cost_by_service(
        &self,
        tenant_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Value, StoreError> {
        let rows: Vec<(ServiceType, String, Decimal)> = sqlx::query_as(
            r#"
            SELECT service_type, service_provider, COALESCE(SUM(total_cost), 0)
            FROM usage_events
            WHERE tenant_id = $1 AND status = 'completed' AND timestamp >= $2 AND timestamp < $3
            GROUP BY service_type, service_provider
            "#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        let mut map = Map::new();
        for (service_type, provider, cost) in rows {
            map.insert(format!("{}:{}", service_type_key(service_type), provider), json!(cost));
        }
        Ok(Value::Object(map))
    }

    async fn cost_by_user(
        &self,
        tenant_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
        limit: i64,
    ) -> Result<Value, StoreError> {
        let rows: Vec<(String, Decimal)> = sqlx::query_as(
            r#"
            SELECT user_id, COALESCE(SUM(total_cost), 0) AS cost
            FROM usage_events
            WHERE tenant_id = $1 AND status = 'completed' AND timestamp >= $2 AND timestamp < $3
            GROUP BY user_id
            ORDER BY cost DESC
            LIMIT $4
            "#,
        )
        .bind(tenant_id)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        let mut map = Map::new();
        for (user_id, cost) in rows {
            map.insert(user_id, json!(cost));
        }
        Ok(Value::Object(map))
    }
}

struct DimensionMetrics {
    event_count: i64,
    unique_users: i64,
    error_count: i64,
    total_cost: Decimal,
    error_rate: Decimal,
    avg_latency_ms: Option<Decimal>,
    p95_latency_ms: Option<Decimal>,
}

fn service_type_key(service_type: ServiceType) -> &'static str {
    match service_type {
        ServiceType::LlmService => "llm_service",
        ServiceType::DocumentProcessor => "document_processor",
        ServiceType::ApiService => "api_service",
        ServiceType::Custom => "custom",
    }
}

/// Align `ts` down to the start of the period it falls in.
fn align_down(ts: OffsetDateTime, period: AggregationPeriod) -> OffsetDateTime {
    match period {
        AggregationPeriod::Hour => ts
            .replace_minute(0)
            .and_then(|t| t.replace_second(0))
            .and_then(|t| t.replace_nanosecond(0))
            .unwrap_or(ts),
        AggregationPeriod::Day => ts.replace_time(Time::MIDNIGHT),
        AggregationPeriod::Week => {
            let midnight = ts.replace_time(Time::MIDNIGHT);
            let days_since_monday = midnight.weekday().number_days_from_monday();
            midnight - Duration::days(i64::from(days_since_monday))
        }
        AggregationPeriod::Month => ts
            .replace_time(Time::MIDNIGHT)
            .replace_day(1)
            .unwrap_or(ts),
    }
}

/// Advance `ts` (already aligned to a period boundary) to the next one.
fn step(ts: OffsetDateTime, period: AggregationPeriod) -> OffsetDateTime {
    match period {
        AggregationPeriod::Hour => ts + Duration::hours(1),
        AggregationPeriod::Day => ts + Duration::days(1),
        AggregationPeriod::Week => ts + Duration::weeks(1),
        AggregationPeriod::Month => {
            let (next_month, next_year) = if ts.month() == Month::December {
                (Month::January, ts.year() + 1)
            } else {
                (ts.month().next(), ts.year())
            };
            ts.replace_year(next_year)
                .and_then(|t| t.replace_month(next_month))
                .unwrap_or(ts)
        }
    }
}

fn step_back_month(ts: OffsetDateTime) -> OffsetDateTime {
    let (prev_month, prev_year) = if ts.month() == Month::January {
        (Month::December, ts.year() - 1)
    } else {
        (ts.month().previous(), ts.year())
    };
    ts.replace_year(prev_year)
        .and_then(|t| t.replace_month(prev_month))
        .unwrap_or(ts)
}
