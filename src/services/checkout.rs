//! Checkout pipeline: validate, reprice, authorize.

use tracing::info;

use crate::error::AppResult;
use crate::logging::mask_email;
use crate::models::cart::{CheckoutRequest, CheckoutResponse};
use crate::services::cart_validator::validate_checkout_request;
use crate::services::payment_intent::PaymentIntentIssuer;
use crate::services::price_reconciliation::PriceReconciler;

#[derive(Clone)]
pub struct CheckoutService {
    reconciler: PriceReconciler,
    issuer: PaymentIntentIssuer,
    max_cart_items: usize,
}

impl CheckoutService {
    pub fn new(
        reconciler: PriceReconciler,
        issuer: PaymentIntentIssuer,
        max_cart_items: usize,
    ) -> Self {
        Self {
            reconciler,
            issuer,
            max_cart_items,
        }
    }

    /// Nothing is sent to the processor unless validation and repricing
    /// both succeed.
    pub async fn checkout(&self, request: &CheckoutRequest) -> AppResult<CheckoutResponse> {
        let validated = validate_checkout_request(request, self.max_cart_items)?;
        let reconciliation = self.reconciler.reconcile(&validated.items).await?;

        let issued = self
            .issuer
            .issue(
                &validated.customer,
                validated.instructions.as_deref(),
                &reconciliation,
            )
            .await?;

        info!(
            payment_intent_id = %issued.payment_intent_id,
            customer = %mask_email(&validated.customer.email),
            items = reconciliation.items.len(),
            subtotal = %issued.totals.subtotal,
            total = %issued.totals.total,
            platform_fee = %issued.totals.platform_fee,
            snapshot = issued.snapshot_encoding.as_str(),
            "checkout authorized"
        );

        Ok(CheckoutResponse {
            client_secret: issued.client_secret,
            payment_intent_id: issued.payment_intent_id,
            amount: issued.totals.total,
        })
    }
}
