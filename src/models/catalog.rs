use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of product sold by the shop. Drives the platform fee tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Drink,
    Food,
    Comic,
    Merchandise,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Drink => "drink",
            ProductType::Food => "food",
            ProductType::Comic => "comic",
            ProductType::Merchandise => "merchandise",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "drink" => Ok(ProductType::Drink),
            "food" => Ok(ProductType::Food),
            "comic" => Ok(ProductType::Comic),
            "merchandise" | "merch" => Ok(ProductType::Merchandise),
            other => Err(format!("unknown product type: {}", other)),
        }
    }
}

/// Authoritative product as stored in the catalog, with sizes and modifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub product_type: ProductType,
    pub base_price: Decimal,
    pub is_active: bool,
    pub in_stock: bool,
    pub sizes: Vec<ProductSize>,
    pub modifier_groups: Vec<ModifierGroup>,
}

impl Product {
    pub fn is_purchasable(&self) -> bool {
        self.is_active && self.in_stock
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSize {
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierGroup {
    pub name: String,
    pub modifiers: Vec<Modifier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modifier {
    pub name: String,
    pub price: Decimal,
    pub is_available: bool,
}
