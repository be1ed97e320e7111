//! Event validation: `RawEvent` → `NormalizedEvent`, pure (no I/O).

use crate::error::{BillingError, FieldError};
use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;
use usagetrack_shared::{NormalizedEvent, RawEvent, ServiceType};
use uuid::Uuid;

/// Validate and normalize a raw event per its `service_type`'s rules.
/// On success, `event_id`/`timestamp` are filled in if the caller omitted
/// them, and derived fields (e.g. `total_tokens`) are computed.
pub fn validate(raw: RawEvent) -> Result<NormalizedEvent, BillingError> {
    let mut errors = Vec::new();

    let user_id = require_string(&raw.user_id, "user_id", &mut errors);
    let service_provider =
        require_option_string(&raw.service_provider, "service_provider", &mut errors);

    let mut metrics = raw.metrics.clone();
    let mut metadata = raw.metadata.clone();

    match raw.service_type {
        ServiceType::LlmService => validate_llm(&metadata, &mut metrics, &mut errors),
        ServiceType::DocumentProcessor => validate_document(&metadata, &metrics, &mut errors),
        ServiceType::ApiService => {
            validate_api(&metadata, &mut metrics, &mut errors);
            normalize_api_method(&mut metadata);
        }
        ServiceType::Custom => validate_custom(&raw, &mut errors),
    }

    if !errors.is_empty() {
        return Err(BillingError::Validation(errors));
    }

    Ok(NormalizedEvent {
        event_id: raw.event_id.unwrap_or_else(Uuid::new_v4),
        timestamp: raw.timestamp.unwrap_or_else(OffsetDateTime::now_utc),
        tenant_id: raw.tenant_id.unwrap_or_default(),
        user_id: user_id.unwrap_or_default(),
        service_type: raw.service_type,
        service_provider: service_provider.unwrap_or_default(),
        event_type: raw.event_type.unwrap_or_else(|| "completion".to_string()),
        metrics,
        metadata,
        tags: raw.tags,
        session_id: raw.session_id,
        request_id: raw.request_id,
    })
}

fn require_string(
    value: &Option<String>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        Some(v) if !v.is_empty() => Some(v.clone()),
        _ => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
    }
}

fn require_option_string(
    value: &Option<String>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    require_string(value, field, errors)
}

fn require_metadata_string(
    metadata: &HashMap<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match metadata.get(field).and_then(Value::as_str) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
    }
}

fn require_metric_u64(
    metrics: &HashMap<String, Value>,
    field: &str,
    min: u64,
    errors: &mut Vec<FieldError>,
) -> Option<u64> {
    match metrics.get(field).and_then(Value::as_u64) {
        Some(v) if v >= min => Some(v),
        Some(_) => {
            errors.push(FieldError::new(field, format!("must be >= {min}")));
            None
        }
        None => {
            errors.push(FieldError::new(field, "is required and must be a non-negative integer"));
            None
        }
    }
}

fn validate_llm(
    metadata: &HashMap<String, Value>,
    metrics: &mut HashMap<String, Value>,
    errors: &mut Vec<FieldError>,
) {
    require_metadata_string(metadata, "model", errors);

    let input_tokens = require_metric_u64(metrics, "input_tokens", 0, errors);
    let output_tokens = require_metric_u64(metrics, "output_tokens", 0, errors);

    if let Some(temperature) = metrics.get("temperature").and_then(Value::as_f64) {
        if !(0.0..=2.0).contains(&temperature) {
            errors.push(FieldError::new("temperature", "must be between 0 and 2"));
        }
    }

    if !metrics.contains_key("total_tokens") {
        if let (Some(input), Some(output)) = (input_tokens, output_tokens) {
            metrics.insert("total_tokens".to_string(), Value::from(input + output));
        }
    }
}

fn validate_document(
    metadata: &HashMap<String, Value>,
    metrics: &HashMap<String, Value>,
    errors: &mut Vec<FieldError>,
) {
    require_metadata_string(metadata, "document_type", errors);
    require_metadata_string(metadata, "processing_type", errors);
    require_metric_u64(metrics, "pages_processed", 1, errors);
}

fn validate_api(
    metadata: &HashMap<String, Value>,
    metrics: &mut HashMap<String, Value>,
    errors: &mut Vec<FieldError>,
) {
    require_metadata_string(metadata, "endpoint", errors);

    if let Some(status) = metrics.get("status_code").and_then(Value::as_i64) {
        if !(100..=599).contains(&status) {
            errors.push(FieldError::new("status_code", "must be between 100 and 599"));
        }
    }

    match metrics.get("request_count").and_then(Value::as_i64) {
        Some(count) if count < 1 => {
            errors.push(FieldError::new("request_count", "must be >= 1"));
        }
        None => {
            metrics.insert("request_count".to_string(), Value::from(1));
        }
        _ => {}
    }
}

fn validate_custom(raw: &RawEvent, errors: &mut Vec<FieldError>) {
    if raw.user_id.as_deref().unwrap_or_default().is_empty() {
        errors.push(FieldError::new("user_id", "is required"));
    }
    if raw.service_provider.as_deref().unwrap_or_default().is_empty() {
        errors.push(FieldError::new("service_provider", "is required"));
    }
    if raw.event_type.as_deref().unwrap_or_default().is_empty() {
        errors.push(FieldError::new("event_type", "is required"));
    }
}

/// Upper-case an HTTP method string, matching `api_service`'s
/// normalization rule. Applied by the caller after validation since the
/// field lives in an open `metadata` map rather than a typed struct.
pub fn normalize_api_method(metadata: &mut HashMap<String, Value>) {
    if let Some(Value::String(method)) = metadata.get("method").cloned() {
        metadata.insert("method".to_string(), Value::String(method.to_uppercase()));
    }
}
