//! Router assembly: health routes are always public, everything under
//! `/api/v1` runs through auth then rate-limiting, in that order —
//! rate-limit buckets key off the authenticated tenant when one is
//! present, so anonymous and authenticated traffic never share a bucket.

pub mod alerts;
pub mod billing_rules;
pub mod health;
pub mod ingest;
pub mod service_registry;
pub mod tenants;
pub mod usage;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::auth::require_auth;
use crate::rate_limit::enforce_rate_limit;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let api_routes = Router::new()
        .route("/events", post(ingest::ingest_event))
        .route("/events/batch", post(ingest::ingest_batch))
        .route("/usage", get(usage::get_usage))
        .route("/usage/aggregate", get(usage::get_usage_aggregate))
        .route("/usage/by-service", get(usage::get_usage_by_service))
        .route("/usage/costs", get(usage::get_usage_costs))
        .route("/analytics/trends", get(usage::get_analytics_trends))
        .route(
            "/tenants",
            get(tenants::list_tenants).post(tenants::create_tenant),
        )
        .route(
            "/tenants/:tenant_id",
            get(tenants::get_tenant).put(tenants::update_tenant),
        )
        .route(
            "/service-registry",
            get(service_registry::list_service_registries)
                .post(service_registry::create_service_registry),
        )
        .route(
            "/service-registry/:service_type",
            get(service_registry::get_service_registry)
                .put(service_registry::update_service_registry),
        )
        .route(
            "/billing-rules",
            get(billing_rules::list_billing_rules).post(billing_rules::create_billing_rule),
        )
        .route("/billing-rules/:id", get(billing_rules::get_billing_rule))
        .route(
            "/alerts/configurations",
            get(alerts::list_alert_configurations).post(alerts::create_alert_configuration),
        )
        .route("/alerts/instances", get(alerts::list_alert_instances))
        .route(
            "/alerts/instances/:id/acknowledge",
            put(alerts::acknowledge_alert_instance),
        );

    health_routes
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), enforce_rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
