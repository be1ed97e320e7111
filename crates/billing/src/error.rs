//! Billing error types.

use thiserror::Error;
use usagetrack_shared::StoreError;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("no applicable billing rule for {service_type}/{service_provider}")]
    NoApplicableRule {
        service_type: String,
        service_provider: String,
    },

    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One field-level validation failure, surfaced verbatim in the API's
/// `field_errors` response body.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
