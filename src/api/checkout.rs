use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

use crate::api::{attach_request_id, enforce_rate_limit, parse_json, AppState};
use crate::error::AppError;
use crate::models::cart::{CheckoutRequest, CheckoutResponse};

/// POST /api/checkout
///
/// Reprices the cart against the catalog and returns the client secret of a
/// new payment intent. Prices in the body are only compared, never charged.
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, AppError> {
    let result = async {
        enforce_rate_limit(&state, &headers, &state.policies.checkout).await?;
        let request: CheckoutRequest = parse_json(&body)?;
        state.checkout.checkout(&request).await
    }
    .await;

    result
        .map(Json)
        .map_err(|e| attach_request_id(e, &headers))
}
