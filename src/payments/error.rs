use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Card declined: {message}")]
    CardDeclined {
        message: String,
        decline_code: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Webhook verification failed: {message}")]
    WebhookVerificationError { message: String },

    #[error("Malformed webhook payload: {message}")]
    WebhookPayloadError { message: String },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::CardDeclined { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::RateLimitError { .. } => true,
            PaymentError::WebhookVerificationError { .. } => false,
            PaymentError::WebhookPayloadError { .. } => false,
            PaymentError::ProviderError { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::WebhookVerificationError { .. } => 400,
            PaymentError::WebhookPayloadError { .. } => 400,
            // Processor failures surface as a generic server error to the shopper
            _ => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::WebhookVerificationError { .. } => "Invalid signature".to_string(),
            PaymentError::WebhookPayloadError { .. } => "Invalid webhook payload".to_string(),
            _ => "Failed to process checkout. Please try again.".to_string(),
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        let kind = match &err {
            PaymentError::WebhookVerificationError { message }
            | PaymentError::WebhookPayloadError { message } => {
                AppErrorKind::Validation(ValidationError::InvalidSignature {
                    reason: message.clone(),
                })
            }
            _ => AppErrorKind::External(ExternalError::Upstream {
                service: "stripe".to_string(),
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };

        AppError::new(kind)
    }
}
