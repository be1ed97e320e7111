//! Pricing engine: rule selection plus cost calculation.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use time::OffsetDateTime;
use usagetrack_shared::{BillingRule, BillingUnit, CalculationMethod, NormalizedEvent, ServiceType, StoreError};

use crate::error::BillingError;

/// The priced outcome of one event, stored verbatim on `UsageEvent.billing_info`.
#[derive(Debug, Clone, Serialize)]
pub struct BillingInfo {
    pub total_cost: Decimal,
    pub billing_unit: BillingUnit,
    pub unit_count: Decimal,
    pub rate_per_unit: Decimal,
    pub calculation_method: CalculationMethod,
    pub base_cost: Decimal,
    pub minimum_charge: Option<Decimal>,
    pub calculated_at: OffsetDateTime,
}

/// Zero-cost result, used when no billing rule applies.
fn zero_cost() -> BillingInfo {
    BillingInfo {
        total_cost: Decimal::ZERO,
        billing_unit: BillingUnit::Custom,
        unit_count: Decimal::ZERO,
        rate_per_unit: Decimal::ZERO,
        calculation_method: CalculationMethod::Custom,
        base_cost: Decimal::ZERO,
        minimum_charge: None,
        calculated_at: OffsetDateTime::now_utc(),
    }
}

/// Select the most-applicable rule for `(service_type, provider)` at
/// `timestamp`, preferring a `model_or_tier`-specific rule over the
/// provider-wide default, then the most recently effective match.
pub async fn select_rule(
    pool: &PgPool,
    service_type: ServiceType,
    provider: &str,
    model_or_tier: Option<&str>,
    timestamp: OffsetDateTime,
) -> Result<Option<BillingRule>, StoreError> {
    let rule = sqlx::query_as::<_, BillingRule>(
        r#"
        SELECT * FROM billing_rules
        WHERE service_type = $1
          AND service_provider = $2
          AND is_active = true
          AND effective_from <= $3
          AND (effective_until IS NULL OR effective_until > $3)
          AND ($4::text IS NULL OR model_or_tier = $4 OR model_or_tier IS NULL)
        ORDER BY model_or_tier DESC NULLS LAST, effective_from DESC
        LIMIT 1
        "#,
    )
    .bind(service_type)
    .bind(provider)
    .bind(timestamp)
    .bind(model_or_tier)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::from_sqlx)?;

    Ok(rule)
}

/// Price a normalized event against a selected rule (or the zero-cost
/// result if no rule was found).
pub fn price(event: &NormalizedEvent, rule: Option<&BillingRule>) -> Result<BillingInfo, BillingError> {
    let Some(rule) = rule else {
        return Ok(zero_cost());
    };

    let unit_count = calculate_unit_count(event.service_type, rule.billing_unit, &event.metrics);

    let base_cost = match rule.calculation_method {
        CalculationMethod::Sum => sum_metrics(&event.metrics) * rule.rate_per_unit,
        CalculationMethod::Multiply | CalculationMethod::Custom => unit_count * rule.rate_per_unit,
    };

    let computed_cost = match &rule.tiered_rates {
        Some(tiers) => apply_tiered_rates(unit_count, tiers, rule.rate_per_unit)?,
        None => base_cost,
    };

    let total_cost = match rule.minimum_charge {
        Some(minimum) => computed_cost.max(minimum),
        None => computed_cost,
    };

    Ok(BillingInfo {
        total_cost: total_cost.round_dp(6),
        billing_unit: rule.billing_unit,
        unit_count,
        rate_per_unit: rule.rate_per_unit,
        calculation_method: rule.calculation_method,
        base_cost,
        minimum_charge: rule.minimum_charge,
        calculated_at: OffsetDateTime::now_utc(),
    })
}

/// Extract the billable unit count for `(service_type, billing_unit)` per
/// the spec's lookup table, falling back to `1` for unrecognized
/// combinations.
fn calculate_unit_count(
    service_type: ServiceType,
    billing_unit: BillingUnit,
    metrics: &HashMap<String, Value>,
) -> Decimal {
    let metric = |key: &str| -> Decimal {
        metrics
            .get(key)
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO)
    };

    match (service_type, billing_unit) {
        (ServiceType::LlmService, BillingUnit::Tokens) => metric("total_tokens"),
        (ServiceType::LlmService, BillingUnit::Requests) => Decimal::ONE,
        (ServiceType::DocumentProcessor, BillingUnit::Pages) => metric("pages_processed"),
        (ServiceType::DocumentProcessor, BillingUnit::Bytes) => metric("file_size_bytes"),
        (ServiceType::DocumentProcessor, BillingUnit::Requests) => Decimal::ONE,
        (ServiceType::ApiService, BillingUnit::Requests) => {
            if metrics.contains_key("request_count") {
                metric("request_count")
            } else {
                Decimal::ONE
            }
        }
        (ServiceType::ApiService, BillingUnit::Bytes) => {
            metric("payload_size_bytes") + metric("response_size_bytes")
        }
        (ServiceType::ApiService, BillingUnit::Minutes) => {
            metric("response_time_ms") / Decimal::from(60_000)
        }
        _ => Decimal::ONE,
    }
}

/// Sum of every numeric value in `metrics`, for `calculation_method=sum`.
fn sum_metrics(metrics: &HashMap<String, Value>) -> Decimal {
    metrics
        .values()
        .filter_map(decimal_from_value)
        .fold(Decimal::ZERO, |acc, v| acc + v)
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(|f| Decimal::from_f64(f))
            .or_else(|| n.as_i64().map(Decimal::from)),
        _ => None,
    }
}

/// Piecewise cost over `tiered_rates`, overriding the flat rate entirely
/// when tiers are present. Tiers are covered in order; a tier with no
/// `to` is unbounded (the top tier).
fn apply_tiered_rates(
    unit_count: Decimal,
    tiered_rates: &Value,
    fallback_rate: Decimal,
) -> Result<Decimal, BillingError> {
    let tiers: Vec<usagetrack_shared::BillingTier> =
        serde_json::from_value::<usagetrack_shared::TieredRates>(tiered_rates.clone())
            .map(|t| t.tiers)
            .unwrap_or_default();

    if tiers.is_empty() {
        return Ok(unit_count * fallback_rate);
    }

    let mut total = Decimal::ZERO;
    for tier in tiers {
        let tier_from = tier.from.max(Decimal::ZERO);
        let tier_to = tier.to.unwrap_or(Decimal::MAX);
        if unit_count <= tier_from {
            continue;
        }
        let width = unit_count.min(tier_to) - tier_from;
        if width > Decimal::ZERO {
            total += width * tier.rate;
        }
    }

    Ok(total)
}
