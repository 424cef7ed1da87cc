use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use crate::api::{attach_request_id, enforce_rate_limit, parse_json, AppState};
use crate::error::AppError;
use crate::models::order::{CreateOrderRequest, OrderReceipt, OrderSummary};
use crate::services::order_materializer::validate_client_order;

/// POST /api/orders
///
/// Called by the storefront once payment has been confirmed. Safe to repeat:
/// a second call for the same payment intent returns the existing order.
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OrderReceipt>, AppError> {
    let result = async {
        enforce_rate_limit(&state, &headers, &state.policies.orders).await?;
        let request: CreateOrderRequest = parse_json(&body)?;
        let draft = validate_client_order(&request)?;
        let receipt = state.materializer.materialize(draft).await?;
        info!(
            order_number = %receipt.order_number,
            duplicate = receipt.duplicate,
            "order submitted by client"
        );
        Ok(receipt)
    }
    .await;

    result
        .map(Json)
        .map_err(|e| attach_request_id(e, &headers))
}

/// GET /api/orders/{order_number}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OrderSummary>, AppError> {
    let result = async {
        enforce_rate_limit(&state, &headers, &state.policies.api).await?;
        state.materializer.find_order(&order_number).await
    }
    .await;

    result
        .map(Json)
        .map_err(|e| attach_request_id(e, &headers))
}
