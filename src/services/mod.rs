//! Checkout and order business logic

pub mod cart_validator;
pub mod checkout;
pub mod order_materializer;
pub mod order_snapshot;
pub mod payment_intent;
pub mod platform_fee;
pub mod price_reconciliation;
pub mod rate_limiter;
pub mod webhook_processor;

pub use checkout::CheckoutService;
pub use order_materializer::{OrderDraft, OrderMaterializer};
pub use payment_intent::PaymentIntentIssuer;
pub use price_reconciliation::PriceReconciler;
pub use rate_limiter::{InMemoryRateLimiter, RateLimitPolicies, RateLimiter};
pub use webhook_processor::{WebhookOutcome, WebhookProcessor, WebhookProcessorError};
