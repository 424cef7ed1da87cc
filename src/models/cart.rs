use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::ProductType;

// ============================================================================
// Untrusted request shapes
// ============================================================================

/// Body of `POST /api/checkout`. Every field is optional at the serde level so
/// that structural problems surface as validation errors with a useful
/// message instead of a generic deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Option<Vec<CartItem>>,
    #[serde(default)]
    pub customer: Option<CustomerInput>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// A cart line as the storefront sends it. Prices are advisory.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub product: Option<ProductRef>,
    #[serde(default)]
    pub size: Option<SizeChoice>,
    #[serde(default)]
    pub modifiers: Vec<ModifierChoice>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProductRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SizeChoice {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModifierChoice {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomerInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

// ============================================================================
// Validated and verified shapes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedCustomer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// A cart line that passed structural validation but has not been priced.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCartItem {
    pub product_ref: String,
    pub size_name: Option<String>,
    pub modifier_names: Vec<String>,
    pub quantity: u32,
    pub client_unit_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct ValidatedCheckout {
    pub customer: ValidatedCustomer,
    pub items: Vec<ValidatedCartItem>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedModifier {
    pub name: String,
    pub price: Decimal,
}

/// A cart line priced against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_type: ProductType,
    pub size_name: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub modifiers: Vec<PricedModifier>,
}

impl VerifiedItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Response body of a successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}
