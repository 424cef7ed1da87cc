//! HTTP surface: routes, shared state and per-route rate limiting.

pub mod checkout;
pub mod health;
pub mod orders;
pub mod webhooks;

use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::warn;

use crate::error::{AppError, AppErrorKind, AppResult, ExternalError};
use crate::health::HealthChecker;
use crate::middleware::error::get_request_id_from_headers;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::rate_limiter::{client_ip, RateLimitPolicy};
use crate::services::{
    CheckoutService, OrderMaterializer, RateLimitPolicies, RateLimiter, WebhookProcessor,
};

#[derive(Clone)]
pub struct AppState {
    pub checkout: CheckoutService,
    pub materializer: OrderMaterializer,
    pub webhooks: Arc<WebhookProcessor>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub policies: RateLimitPolicies,
    pub health: HealthChecker,
}

pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api/checkout", post(checkout::create_checkout))
        .route("/api/orders", post(orders::create_order))
        .route("/api/orders/{order_number}", get(orders::get_order))
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// An empty list or `*` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Count this request against `policy` for the calling IP.
pub(crate) async fn enforce_rate_limit(
    state: &AppState,
    headers: &HeaderMap,
    policy: &RateLimitPolicy,
) -> AppResult<()> {
    let client = client_ip(headers);
    let decision = state.rate_limiter.check(&client, policy).await;
    if decision.allowed {
        return Ok(());
    }

    warn!(
        scope = %policy.scope,
        client = %client,
        limiter = state.rate_limiter.name(),
        retry_after = ?decision.retry_after,
        "rate limit exceeded"
    );
    Err(AppError::new(AppErrorKind::External(ExternalError::RateLimit {
        scope: policy.scope.to_string(),
        limit: decision.limit,
        retry_after: decision.retry_after.unwrap_or(1),
    })))
}

/// Parse a JSON body, reporting malformed input as a validation error.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::validation("body", "Invalid request body").with_context(e.to_string()))
}

pub(crate) fn attach_request_id(error: AppError, headers: &HeaderMap) -> AppError {
    match get_request_id_from_headers(headers) {
        Some(request_id) => error.with_request_id(request_id),
        None => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cart::CheckoutRequest;

    #[test]
    fn test_parse_json_rejects_garbage() {
        let err = parse_json::<CheckoutRequest>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.user_message(), "Invalid request body");
    }

    #[test]
    fn test_attach_request_id_reads_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));
        let err = attach_request_id(AppError::validation("items", "Cart is empty"), &headers);
        assert_eq!(err.request_id.as_deref(), Some("req-1"));
    }
}
