use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::cart::CustomerInput;

/// Fulfilment status of an order.
///
/// `pending -> preparing -> ready -> completed`, with `cancelled` reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, OrderStatus::Cancelled) => true,
            (OrderStatus::Pending, OrderStatus::Preparing) => true,
            (OrderStatus::Preparing, OrderStatus::Ready) => true,
            (OrderStatus::Ready, OrderStatus::Completed) => true,
            _ => false,
        }
    }

    /// Statuses from which `next` may be entered.
    pub fn predecessors(next: OrderStatus) -> Vec<OrderStatus> {
        [
            OrderStatus::Pending,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ]
        .into_iter()
        .filter(|status| status.can_transition_to(next))
        .collect()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Which path materialized the order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    Client,
    Webhook,
}

impl OrderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSource::Client => "client",
            OrderSource::Webhook => "webhook",
        }
    }
}

impl FromStr for OrderSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "client" => Ok(OrderSource::Client),
            "webhook" => Ok(OrderSource::Webhook),
            other => Err(format!("unknown order source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: String,
    pub special_instructions: Option<String>,
    pub source: OrderSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<String>,
    pub product_name: String,
    pub size_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub modifiers: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub payment_intent_id: String,
    pub special_instructions: Option<String>,
    pub source: OrderSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: Option<String>,
    pub product_name: String,
    pub size_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub modifiers: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerInput>,
    #[serde(default)]
    pub items: Option<Vec<OrderLineInput>>,
    #[serde(default)]
    pub subtotal: Option<f64>,
    #[serde(default)]
    pub tax: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// An order line as reported by the storefront after payment. Loosely typed
/// because it is only sanitized and stored, never priced.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineInput {
    #[serde(default)]
    pub product_id: Option<serde_json::Value>,
    #[serde(default)]
    pub product_name: Option<serde_json::Value>,
    #[serde(default)]
    pub size_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<serde_json::Value>,
    #[serde(default)]
    pub unit_price: Option<serde_json::Value>,
    #[serde(default)]
    pub modifiers: Option<serde_json::Value>,
}

/// Result of materializing an order, shared by both creation paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub success: bool,
    pub order_number: String,
    pub order_id: Uuid,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub duplicate: bool,
}

/// Public view of an order for tracking. Carries only the customer's first name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_number: String,
    pub customer_first_name: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderSummaryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummaryItem {
    pub product_name: String,
    pub size_name: Option<String>,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    pub modifiers: serde_json::Value,
}

impl From<OrderWithItems> for OrderSummary {
    fn from(value: OrderWithItems) -> Self {
        let OrderWithItems { order, items } = value;
        let customer_first_name = order
            .customer_name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            order_number: order.order_number,
            customer_first_name,
            status: order.status,
            payment_status: order.payment_status,
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|item| OrderSummaryItem {
                    product_name: item.product_name,
                    size_name: item.size_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    modifiers: item.modifiers,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine_moves_forward_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Preparing));
        assert!(OrderStatus::Preparing.can_transition_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Preparing));
    }

    #[test]
    fn cancellation_only_from_non_terminal_states() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn predecessors_follow_the_machine() {
        assert_eq!(
            OrderStatus::predecessors(OrderStatus::Ready),
            vec![OrderStatus::Preparing]
        );
        assert_eq!(
            OrderStatus::predecessors(OrderStatus::Cancelled),
            vec![
                OrderStatus::Pending,
                OrderStatus::Preparing,
                OrderStatus::Ready
            ]
        );
        assert!(OrderStatus::predecessors(OrderStatus::Pending).is_empty());
    }

    #[test]
    fn receipt_omits_duplicate_flag_when_false() {
        let receipt = OrderReceipt {
            success: true,
            order_number: "BB-ABCD1234".to_string(),
            order_id: Uuid::nil(),
            duplicate: false,
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert!(json.get("duplicate").is_none());
        assert_eq!(json["orderNumber"], "BB-ABCD1234");
    }
}
