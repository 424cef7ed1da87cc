use crate::payments::error::PaymentResult;
use crate::payments::types::{PaymentIntent, PaymentIntentRequest, WebhookEvent};
use async_trait::async_trait;

/// Payment processor seam used by checkout and the webhook endpoint.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create an authorization. Not retried: the call is not idempotent.
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> PaymentResult<PaymentIntent>;

    /// Verify the signature header against the raw body, then parse the event.
    fn construct_event(&self, payload: &[u8], signature_header: &str)
        -> PaymentResult<WebhookEvent>;

    fn name(&self) -> &'static str;
}
