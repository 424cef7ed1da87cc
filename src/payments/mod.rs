//! Payment processor integration: the `PaymentProcessor` seam, its Stripe
//! implementation, wire types and webhook signature helpers.

pub mod error;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use provider::PaymentProcessor;
