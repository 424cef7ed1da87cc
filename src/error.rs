//! Unified error handling for the Blackbird checkout backend
//!
//! Every failure surfaced over HTTP is an [`AppError`]: a kind (domain,
//! infrastructure, external, validation) mapped to an HTTP status, a stable
//! machine-readable [`ErrorCode`] and a user-facing message that never leaks
//! internal detail.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by the storefront
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "PRODUCT_NOT_FOUND")]
    ProductNotFound,
    #[serde(rename = "PRODUCT_UNAVAILABLE")]
    ProductUnavailable,
    #[serde(rename = "MODIFIER_UNAVAILABLE")]
    ModifierUnavailable,
    #[serde(rename = "PRICE_MISMATCH")]
    PriceMismatch,
    #[serde(rename = "AMOUNT_OUT_OF_RANGE")]
    AmountOutOfRange,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "INVALID_TRANSITION")]
    InvalidTransition,

    // Infrastructure errors (5xx)
    #[serde(rename = "PERSISTENCE_FAILURE")]
    PersistenceFailure,
    #[serde(rename = "CACHE_ERROR")]
    CacheError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors
    #[serde(rename = "UPSTREAM_FAILURE")]
    UpstreamFailure,
    #[serde(rename = "RATE_LIMITED")]
    RateLimited,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "SIGNATURE_INVALID")]
    SignatureInvalid,
}

/// Pricing and ordering rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Product id was not returned by the catalog
    ProductNotFound { product_id: String },
    /// Product exists but is inactive or out of stock
    ProductUnavailable { product_name: String },
    /// Requested modifier is unknown or unavailable for the product
    ModifierUnavailable {
        product_name: String,
        modifier: String,
    },
    /// Client-declared unit price deviates from the catalog price
    PriceMismatch {
        product_name: String,
        expected: Decimal,
        received: Decimal,
    },
    /// Order total outside the accepted range
    AmountOutOfRange {
        total: Decimal,
        min: Decimal,
        max: Decimal,
    },
    /// Requested resource does not exist
    NotFound { resource: String, id: String },
    /// Order status change not allowed by the state machine
    InvalidTransition { from: String, to: String },
}

/// Infrastructure-level errors (database, cache, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Order store write or read failure
    Database { message: String, is_retryable: bool },
    /// Redis unavailable
    Cache { message: String },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// Failures of collaborators outside the process
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Catalog read or payment processor call failed
    Upstream {
        service: String,
        message: String,
        is_retryable: bool,
    },
    /// Per-client request budget exhausted
    RateLimit {
        scope: String,
        limit: u32,
        retry_after: u64,
    },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Cart has no items
    EmptyCart,
    /// Cart or order carries more lines than allowed
    TooManyItems { count: usize, max: usize },
    /// Field present but malformed; `reason` is shown to the user
    InvalidField { field: String, reason: String },
    /// Required field missing
    MissingField { field: String },
    /// Field value out of acceptable range
    OutOfRange {
        field: String,
        min: Option<String>,
        max: Option<String>,
    },
    /// Webhook payload failed signature verification
    InvalidSignature { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::External(ExternalError::Upstream {
            service: service.into(),
            message: message.into(),
            is_retryable: true,
        }))
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { .. } => 404,
                DomainError::InvalidTransition { .. } => 409,
                _ => 400,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::Upstream { .. } => 500,
                ExternalError::RateLimit { .. } => 429,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::ProductNotFound { .. } => ErrorCode::ProductNotFound,
                DomainError::ProductUnavailable { .. } => ErrorCode::ProductUnavailable,
                DomainError::ModifierUnavailable { .. } => ErrorCode::ModifierUnavailable,
                DomainError::PriceMismatch { .. } => ErrorCode::PriceMismatch,
                DomainError::AmountOutOfRange { .. } => ErrorCode::AmountOutOfRange,
                DomainError::NotFound { .. } => ErrorCode::NotFound,
                DomainError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::PersistenceFailure,
                InfrastructureError::Cache { .. } => ErrorCode::CacheError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Upstream { .. } => ErrorCode::UpstreamFailure,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimited,
            },
            AppErrorKind::Validation(ValidationError::InvalidSignature { .. }) => {
                ErrorCode::SignatureInvalid
            }
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::ProductNotFound { .. } => {
                    "One or more items in your cart are no longer available".to_string()
                }
                DomainError::ProductUnavailable { product_name } => {
                    format!("{} is currently unavailable", product_name)
                }
                DomainError::ModifierUnavailable {
                    product_name,
                    modifier,
                } => format!(
                    "Option '{}' is not available for {}",
                    modifier, product_name
                ),
                DomainError::PriceMismatch { product_name, .. } => format!(
                    "The price of {} has changed. Please refresh your cart",
                    product_name
                ),
                DomainError::AmountOutOfRange { .. } => {
                    "Order total out of acceptable range".to_string()
                }
                DomainError::NotFound { resource, id } => {
                    format!("{} '{}' not found", resource, id)
                }
                DomainError::InvalidTransition { from, to } => {
                    format!("Cannot move order from {} to {}", from, to)
                }
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => {
                    "Failed to create order. Please try again".to_string()
                }
                _ => "Service temporarily unavailable. Please try again later".to_string(),
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Upstream { .. } => {
                    "Failed to process checkout. Please try again.".to_string()
                }
                ExternalError::RateLimit { retry_after, .. } => format!(
                    "Too many requests. Please try again in {} seconds",
                    retry_after
                ),
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::EmptyCart => "Cart is empty".to_string(),
                ValidationError::TooManyItems { .. } => "Too many items in cart".to_string(),
                ValidationError::InvalidField { reason, .. } => reason.clone(),
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::OutOfRange { field, min, max } => match (min, max) {
                    (Some(min), Some(max)) => {
                        format!("Field '{}' must be between {} and {}", field, min, max)
                    }
                    (Some(min), None) => format!("Field '{}' must be at least {}", field, min),
                    (None, Some(max)) => format!("Field '{}' must be at most {}", field, max),
                    (None, None) => format!("Field '{}' is out of acceptable range", field),
                },
                ValidationError::InvalidSignature { .. } => "Invalid signature".to_string(),
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Cache { .. } => true,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Upstream { is_retryable, .. } => *is_retryable,
                ExternalError::RateLimit { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }

    /// Seconds a rate-limited client should wait, if this is a rate limit error
    pub fn retry_after(&self) -> Option<u64> {
        match &self.kind {
            AppErrorKind::External(ExternalError::RateLimit { retry_after, .. }) => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError>, From<PaymentError> and From<ConfigError> live next to
// their error types.

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
