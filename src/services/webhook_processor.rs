use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::models::cart::ValidatedCustomer;
use crate::models::order::{OrderReceipt, OrderSource};
use crate::payments::error::PaymentError;
use crate::payments::provider::PaymentProcessor;
use crate::payments::types::{
    PaymentIntent, WebhookEvent, EVENT_PAYMENT_FAILED, EVENT_PAYMENT_SUCCEEDED,
};
use crate::services::cart_validator::{
    normalize_phone, sanitize_optional, sanitize_string, MAX_CLIENT_AMOUNT, MAX_INSTRUCTIONS_LEN,
    MAX_NAME_LEN,
};
use crate::services::order_materializer::{OrderDraft, OrderMaterializer};
use crate::services::order_snapshot::{decode_snapshot, DecodedSnapshot};
use crate::services::payment_intent::metadata_keys;

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Processing error: {0}")]
    ProcessingError(#[from] AppError),
}

impl From<PaymentError> for WebhookProcessorError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::WebhookVerificationError { message } => {
                WebhookProcessorError::InvalidSignature(message)
            }
            PaymentError::WebhookPayloadError { message } => {
                WebhookProcessorError::InvalidPayload(message)
            }
            other => WebhookProcessorError::InvalidPayload(other.to_string()),
        }
    }
}

/// What happened to a verified event. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    OrderCreated(OrderReceipt),
    Duplicate(OrderReceipt),
    PaymentFailed { payment_intent_id: String },
    Ignored { event_type: String },
    /// The intent carried no usable order metadata
    Skipped { payment_intent_id: String, reason: String },
}

pub struct WebhookProcessor {
    processor: Arc<dyn PaymentProcessor>,
    materializer: OrderMaterializer,
}

impl WebhookProcessor {
    pub fn new(processor: Arc<dyn PaymentProcessor>, materializer: OrderMaterializer) -> Self {
        Self {
            processor,
            materializer,
        }
    }

    /// Verify the raw body against its signature header, then dispatch.
    pub async fn process_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                WebhookProcessorError::InvalidSignature("missing signature header".to_string())
            })?;

        let event = self
            .processor
            .construct_event(payload, signature)
            .map_err(|e| {
                error!(provider = self.processor.name(), error = %e, "webhook verification failed");
                WebhookProcessorError::from(e)
            })?;

        info!(event_id = %event.id, event_type = %event.event_type, "webhook event received");
        self.process_event(&event).await
    }

    async fn process_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        match event.event_type.as_str() {
            EVENT_PAYMENT_SUCCEEDED => {
                let intent = event.payment_intent()?;
                self.handle_payment_success(&intent).await
            }
            EVENT_PAYMENT_FAILED => {
                let intent = event.payment_intent()?;
                let reason = intent.failure_message().unwrap_or_else(|| "unknown".to_string());
                warn!(payment_intent_id = %intent.id, reason = %reason, "payment failed");
                Ok(WebhookOutcome::PaymentFailed {
                    payment_intent_id: intent.id,
                })
            }
            other => {
                info!(event_type = %other, "unhandled webhook event type");
                Ok(WebhookOutcome::Ignored {
                    event_type: other.to_string(),
                })
            }
        }
    }

    async fn handle_payment_success(
        &self,
        intent: &PaymentIntent,
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let draft = match draft_from_payment(intent) {
            Ok(draft) => draft,
            Err(reason) => {
                warn!(payment_intent_id = %intent.id, reason = %reason, "payment intent has no usable order metadata");
                return Ok(WebhookOutcome::Skipped {
                    payment_intent_id: intent.id.clone(),
                    reason,
                });
            }
        };

        let receipt = self.materializer.materialize(draft).await?;
        if receipt.duplicate {
            Ok(WebhookOutcome::Duplicate(receipt))
        } else {
            Ok(WebhookOutcome::OrderCreated(receipt))
        }
    }
}

fn required_metadata<'a>(intent: &'a PaymentIntent, key: &str) -> Result<&'a str, String> {
    intent
        .metadata_value(key)
        .ok_or_else(|| format!("missing metadata '{}'", key))
}

fn metadata_amount(intent: &PaymentIntent, key: &str) -> Result<Decimal, String> {
    let raw = required_metadata(intent, key)?;
    let amount = Decimal::from_str(raw.trim())
        .map_err(|_| format!("metadata '{}' is not an amount: {}", key, raw))?;
    if amount < Decimal::ZERO || amount > Decimal::from(MAX_CLIENT_AMOUNT as i64) {
        return Err(format!("metadata '{}' is out of range: {}", key, raw));
    }
    Ok(amount)
}

/// Rebuild an order from the metadata written at checkout.
///
/// Customer and money fields are required. A missing or unreadable item
/// snapshot still yields an order, without lines.
pub fn draft_from_payment(intent: &PaymentIntent) -> Result<OrderDraft, String> {
    use metadata_keys::*;

    let name = sanitize_string(required_metadata(intent, CUSTOMER_NAME)?, MAX_NAME_LEN);
    let email = required_metadata(intent, CUSTOMER_EMAIL)?.trim().to_lowercase();
    let phone = intent.metadata_value(CUSTOMER_PHONE).and_then(normalize_phone);

    let subtotal = metadata_amount(intent, SUBTOTAL)?;
    let tax = metadata_amount(intent, TAX)?;
    let total = metadata_amount(intent, TOTAL)?;

    let items = match intent.metadata_value(ITEMS).map(decode_snapshot) {
        Some(Ok(DecodedSnapshot::Lines(lines))) => lines,
        Some(Ok(DecodedSnapshot::CountOnly(count))) => {
            warn!(
                payment_intent_id = %intent.id,
                count,
                "item snapshot was truncated, order created without items"
            );
            Vec::new()
        }
        Some(Err(e)) => {
            warn!(payment_intent_id = %intent.id, error = %e, "item snapshot unreadable");
            Vec::new()
        }
        None => {
            warn!(payment_intent_id = %intent.id, "payment intent has no item snapshot");
            Vec::new()
        }
    };

    Ok(OrderDraft {
        payment_intent_id: intent.id.clone(),
        customer: ValidatedCustomer { name, email, phone },
        subtotal,
        tax,
        total,
        instructions: sanitize_optional(intent.metadata_value(INSTRUCTIONS), MAX_INSTRUCTIONS_LEN),
        items,
        source: OrderSource::Webhook,
    })
}
