use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::api::{attach_request_id, enforce_rate_limit, AppState};
use crate::services::webhook_processor::{WebhookOutcome, WebhookProcessorError};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/webhooks/stripe
///
/// The body is taken raw because the signature covers the exact bytes sent.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = enforce_rate_limit(&state, &headers, &state.policies.webhook).await {
        return attach_request_id(e, &headers).into_response();
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.webhooks.process_webhook(&body, signature).await {
        Ok(outcome) => {
            match &outcome {
                WebhookOutcome::OrderCreated(receipt) => {
                    info!(order_number = %receipt.order_number, "order created from webhook")
                }
                WebhookOutcome::Duplicate(receipt) => {
                    info!(order_number = %receipt.order_number, "webhook for existing order")
                }
                WebhookOutcome::PaymentFailed { .. }
                | WebhookOutcome::Ignored { .. }
                | WebhookOutcome::Skipped { .. } => {}
            }
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        Err(WebhookProcessorError::InvalidSignature(reason)) => {
            warn!(reason = %reason, "rejected webhook signature");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid signature" })),
            )
                .into_response()
        }
        Err(WebhookProcessorError::InvalidPayload(reason)) => {
            warn!(reason = %reason, "rejected webhook payload");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid payload" })),
            )
                .into_response()
        }
        Err(WebhookProcessorError::ProcessingError(e)) => {
            error!(error = ?e.kind, context = ?e.context, "webhook handler failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Webhook handler failed" })),
            )
                .into_response()
        }
    }
}
