//! Entity types shared by the ingest API, the worker, and the billing crate.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Usage event ID. Client-supplied; doubles as the idempotency key for
/// the upsert the event processor performs on store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EventId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Aggregate row ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(pub Uuid);

impl AggregateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AggregateId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Billing rule ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillingRuleId(pub Uuid);

impl BillingRuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BillingRuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BillingRuleId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// API key ID, distinct from the raw secret handed to the caller once at
/// creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyId(pub Uuid);

impl ApiKeyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApiKeyId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ApiKeyId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// `tenant_id` is an opaque, caller-assigned string rather than a UUID
/// (spec §3) — tenants originate from the registering system, not from us.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// The kind of service an event describes. Drives which validator runs and
/// which unit-counting rule the pricing engine applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    LlmService,
    DocumentProcessor,
    ApiService,
    Custom,
}

/// Lifecycle state of a `UsageEvent` as it moves through the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

/// Roll-up granularity for a `UsageAggregate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AggregationPeriod {
    Hour,
    Day,
    Week,
    Month,
}

impl AggregationPeriod {
    /// Length of one period bucket, for tiling a date range. Month has no
    /// fixed duration (calendar months vary); callers that need month
    /// tiling must compute boundaries explicitly rather than add this.
    pub fn fixed_duration(&self) -> Option<time::Duration> {
        match self {
            Self::Hour => Some(time::Duration::hours(1)),
            Self::Day => Some(time::Duration::days(1)),
            Self::Week => Some(time::Duration::weeks(1)),
            Self::Month => None,
        }
    }
}

/// What an `AlertConfiguration` threshold is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    UsageThreshold,
    ErrorRate,
    CostThreshold,
    LatencyThreshold,
}

/// Lifecycle state of a fired `AlertInstance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Resolved,
    Acknowledged,
}

/// The dimension a `BillingRule` prices against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingUnit {
    Tokens,
    Requests,
    Pages,
    Bytes,
    Minutes,
    Custom,
}

/// How a `BillingRule`'s `rate_per_unit` combines with the counted units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    Multiply,
    Sum,
    Custom,
}

/// Processing status used by the queue adapter's dead-letter bookkeeping.
/// Distinct from `EventStatus`: this tracks queue residency, not billing
/// completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    DeadLetter,
}

// =============================================================================
// Core entities
// =============================================================================

/// The fact table: one row per ingested usage event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageEvent {
    pub id: Uuid,
    pub event_id: Uuid,
    pub tenant_id: String,
    pub timestamp: OffsetDateTime,
    pub user_id: String,
    pub service_type: ServiceType,
    pub service_provider: String,
    pub event_type: String,
    pub metrics: serde_json::Value,
    pub metadata: serde_json::Value,
    pub tags: Vec<String>,
    pub billing_info: serde_json::Value,
    pub total_cost: rust_decimal::Decimal,
    pub status: EventStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A rolled-up counter row for one tenant/period/dimension combination.
/// `service_type`, `service_provider`, and `user_id` are `None` to mean
/// "all" within that dimension — see the unique constraint note in
/// `SPEC_FULL.md` §14.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageAggregate {
    pub id: Uuid,
    pub tenant_id: String,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub period_type: AggregationPeriod,
    pub service_type: Option<ServiceType>,
    pub service_provider: Option<String>,
    pub user_id: Option<String>,
    pub event_count: i64,
    pub unique_users: i64,
    pub error_count: i64,
    pub total_cost: rust_decimal::Decimal,
    pub error_rate: rust_decimal::Decimal,
    pub avg_latency_ms: Option<rust_decimal::Decimal>,
    pub p95_latency_ms: Option<rust_decimal::Decimal>,
    pub aggregated_metrics: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A per-billing-period rollup, keyed on `(tenant_id, billing_period_start,
/// billing_period_end)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingSummary {
    pub id: Uuid,
    pub tenant_id: String,
    pub billing_period_start: OffsetDateTime,
    pub billing_period_end: OffsetDateTime,
    pub total_cost: rust_decimal::Decimal,
    pub cost_by_service: serde_json::Value,
    pub cost_by_user: serde_json::Value,
    pub total_events: i64,
    pub active_users: i64,
    pub is_finalized: bool,
    pub finalized_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Per-service-type configuration: accepted providers, required/optional
/// fields, and the enrichment/aggregation rules the processor applies.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceRegistry {
    pub id: Uuid,
    pub service_type: ServiceType,
    pub providers: serde_json::Value,
    pub required_fields: serde_json::Value,
    pub optional_fields: serde_json::Value,
    pub billing_config: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A pricing rule. `model_or_tier` narrows the match to a specific model
/// (e.g. `gpt-4o`); `None` makes it the provider-wide default.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingRule {
    pub id: Uuid,
    pub service_type: ServiceType,
    pub service_provider: String,
    pub model_or_tier: Option<String>,
    pub billing_unit: BillingUnit,
    pub rate_per_unit: rust_decimal::Decimal,
    pub tiered_rates: Option<serde_json::Value>,
    pub minimum_charge: Option<rust_decimal::Decimal>,
    pub calculation_method: CalculationMethod,
    pub effective_from: OffsetDateTime,
    pub effective_until: Option<OffsetDateTime>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One tier of a `BillingRule.tiered_rates` piecewise schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BillingTier {
    pub from: rust_decimal::Decimal,
    pub to: Option<rust_decimal::Decimal>,
    pub rate: rust_decimal::Decimal,
}

/// The deserialized shape of `BillingRule.tiered_rates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieredRates {
    pub tiers: Vec<BillingTier>,
}

/// The registering tenant. `tenant_id` (the string key everything else
/// foreign-keys against) is distinct from `id` (the row's own identity).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub status: String,
    pub billing_contact: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// An API key issued to a tenant. Only `key_hash` and `key_prefix` are
/// stored; the raw key is returned once, at creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub is_active: bool,
    pub last_used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
}

/// A configured threshold. `service_type`/`service_provider` `None` means
/// the threshold applies across all values of that dimension.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertConfiguration {
    pub id: Uuid,
    pub tenant_id: String,
    pub alert_type: AlertType,
    pub threshold: rust_decimal::Decimal,
    pub operator: String,
    pub time_window_secs: i32,
    pub service_type: Option<ServiceType>,
    pub service_provider: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A fired instance of an `AlertConfiguration`'s threshold crossing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertInstance {
    pub id: Uuid,
    pub alert_configuration_id: Uuid,
    pub tenant_id: String,
    pub status: AlertStatus,
    pub observed_value: rust_decimal::Decimal,
    pub triggered_at: OffsetDateTime,
    pub acknowledged_at: Option<OffsetDateTime>,
    pub resolved_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// API request/response types
// =============================================================================

/// A raw event as received over HTTP, before validation. Fields are loose
/// (`serde_json::Value` for metrics/metadata) because shape requirements
/// vary per `service_type` — the validator, not serde, enforces them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_id: Option<Uuid>,
    pub timestamp: Option<OffsetDateTime>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub service_type: ServiceType,
    pub service_provider: Option<String>,
    pub event_type: Option<String>,
    #[serde(default)]
    pub metrics: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

/// The validator's output: a `RawEvent` with required fields confirmed
/// present and derived fields (e.g. `total_tokens`) filled in. Also the
/// wire format pushed onto the queue between the ingest API and the
/// worker, so it round-trips through `serde_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event_id: Uuid,
    pub timestamp: OffsetDateTime,
    pub tenant_id: String,
    pub user_id: String,
    pub service_type: ServiceType,
    pub service_provider: String,
    pub event_type: String,
    pub metrics: HashMap<String, serde_json::Value>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

/// Response body for `POST /api/v1/events`.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub event_id: Uuid,
    pub message: String,
}

/// One failure entry inside a batch-ingest response.
#[derive(Debug, Clone, Serialize)]
pub struct FailedEvent {
    pub index: usize,
    pub error: String,
    pub event_data: serde_json::Value,
}

/// Response body for `POST /api/v1/events/batch`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchIngestResponse {
    pub processed_count: usize,
    pub failed_count: usize,
    pub failed_events: Vec<FailedEvent>,
    pub message: String,
}

/// Paginated list wrapper, used by every list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            data,
            total,
            limit,
            offset,
        }
    }
}
