//! Idempotent order creation shared by the storefront and the webhook.
//!
//! Both producers build an [`OrderDraft`] and hand it to
//! [`OrderMaterializer::materialize`]. At most one order exists per payment
//! intent: an existing order is returned as a duplicate, and a lost insert
//! race is resolved by the `payment_intent_id` unique constraint.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::repository::{InsertOutcome, OrderStore};
use crate::error::{AppError, AppErrorKind, AppResult, InfrastructureError, ValidationError};
use crate::models::cart::ValidatedCustomer;
use crate::models::order::{
    CreateOrderRequest, NewOrder, NewOrderItem, Order, OrderLineInput, OrderReceipt,
    OrderSource, OrderStatus, OrderSummary,
};
use crate::payments::utils::round_cents;
use crate::services::cart_validator::{
    is_valid_amount, sanitize_optional, sanitize_string, validate_customer,
    MAX_INSTRUCTIONS_LEN, MAX_QUANTITY, MIN_QUANTITY,
};

pub const ORDER_NUMBER_PREFIX: &str = "BB-";
pub const MAX_ORDER_LINES: usize = 50;
const MIN_PAYMENT_ID_LEN: usize = 20;
const MAX_PRODUCT_NAME_LEN: usize = 200;
const MAX_PRODUCT_ID_LEN: usize = 100;
const MAX_SIZE_NAME_LEN: usize = 50;
const MAX_LINE_MODIFIERS: usize = 20;
const MAX_ORDER_NUMBER_LEN: usize = 32;
const UNKNOWN_PRODUCT: &str = "Unknown";

/// `"BB-"` followed by the last eight characters of the payment id, uppercased.
pub fn order_number_for(payment_intent_id: &str) -> String {
    let chars: Vec<char> = payment_intent_id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(8)..].iter().collect();
    format!("{}{}", ORDER_NUMBER_PREFIX, tail.to_uppercase())
}

/// Everything needed to write one order, already sanitized.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub payment_intent_id: String,
    pub customer: ValidatedCustomer,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub instructions: Option<String>,
    pub items: Vec<NewOrderItem>,
    pub source: OrderSource,
}

impl OrderDraft {
    fn new_order(&self) -> NewOrder {
        NewOrder {
            order_number: order_number_for(&self.payment_intent_id),
            customer_name: self.customer.name.clone(),
            customer_email: self.customer.email.clone(),
            customer_phone: self.customer.phone.clone(),
            subtotal: self.subtotal,
            tax: self.tax,
            total: self.total,
            payment_intent_id: self.payment_intent_id.clone(),
            special_instructions: self.instructions.clone(),
            source: self.source,
        }
    }
}

fn value_as_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Clamp a loosely typed storefront line into something safe to store.
pub fn sanitize_order_line(line: &OrderLineInput) -> NewOrderItem {
    let product_id = value_as_text(line.product_id.as_ref())
        .map(|id| sanitize_string(&id, MAX_PRODUCT_ID_LEN))
        .filter(|id| !id.is_empty());

    let product_name = value_as_text(line.product_name.as_ref())
        .map(|name| sanitize_string(&name, MAX_PRODUCT_NAME_LEN))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string());

    let quantity = value_as_f64(line.quantity.as_ref())
        .map(f64::trunc)
        .filter(|q| *q >= 1.0)
        .map(|q| q.min(MAX_QUANTITY as f64) as u32)
        .unwrap_or(MIN_QUANTITY)
        .clamp(MIN_QUANTITY, MAX_QUANTITY);

    let unit_price = value_as_f64(line.unit_price.as_ref())
        .and_then(Decimal::from_f64)
        .map(round_cents)
        .unwrap_or(Decimal::ZERO)
        .max(Decimal::ZERO);

    let modifiers = match &line.modifiers {
        Some(Value::Array(values)) => {
            Value::Array(values.iter().take(MAX_LINE_MODIFIERS).cloned().collect())
        }
        _ => Value::Array(Vec::new()),
    };

    NewOrderItem {
        product_id,
        product_name,
        size_name: sanitize_optional(line.size_name.as_deref(), MAX_SIZE_NAME_LEN),
        quantity: quantity as i32,
        unit_price,
        modifiers,
    }
}

fn client_amount(value: Option<f64>) -> Option<Decimal> {
    value
        .filter(|amount| is_valid_amount(*amount))
        .and_then(Decimal::from_f64)
        .map(round_cents)
}

/// Validate a storefront order request. The first failing check is reported.
pub fn validate_client_order(request: &CreateOrderRequest) -> AppResult<OrderDraft> {
    let payment_intent_id = request
        .payment_intent_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
                field: "paymentIntentId".to_string(),
            }))
        })?;

    if !payment_intent_id.starts_with("pi_") || payment_intent_id.len() < MIN_PAYMENT_ID_LEN {
        return Err(AppError::validation(
            "paymentIntentId",
            "Invalid payment intent format",
        ));
    }

    let customer = validate_customer(request.customer.as_ref())?;

    let lines = match request.items.as_deref() {
        Some(lines) if !lines.is_empty() => lines,
        _ => return Err(AppError::validation("items", "Order must contain items")),
    };
    if lines.len() > MAX_ORDER_LINES {
        return Err(AppError::validation("items", "Too many items in order"));
    }

    let amounts = (
        client_amount(request.subtotal),
        client_amount(request.tax),
        client_amount(request.total),
    );
    let (subtotal, tax, total) = match amounts {
        (Some(subtotal), Some(tax), Some(total)) => (subtotal, tax, total),
        _ => return Err(AppError::validation("amounts", "Invalid order amounts")),
    };

    Ok(OrderDraft {
        payment_intent_id: payment_intent_id.to_string(),
        customer,
        subtotal,
        tax,
        total,
        instructions: sanitize_optional(request.instructions.as_deref(), MAX_INSTRUCTIONS_LEN),
        items: lines.iter().map(sanitize_order_line).collect(),
        source: OrderSource::Client,
    })
}

fn duplicate_receipt(order: &Order) -> OrderReceipt {
    OrderReceipt {
        success: true,
        order_number: order.order_number.clone(),
        order_id: order.id,
        duplicate: true,
    }
}

#[derive(Clone)]
pub struct OrderMaterializer {
    store: Arc<dyn OrderStore>,
}

impl OrderMaterializer {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Create the order for `draft.payment_intent_id` unless it already exists.
    ///
    /// Item rows are written after the order; failing to write them is logged
    /// and does not fail the order, since payment has already been captured.
    pub async fn materialize(&self, draft: OrderDraft) -> AppResult<OrderReceipt> {
        if let Some(existing) = self
            .store
            .find_by_payment_intent(&draft.payment_intent_id)
            .await?
        {
            info!(
                order_number = %existing.order_number,
                payment_intent_id = %draft.payment_intent_id,
                source = draft.source.as_str(),
                "order already exists for payment intent"
            );
            return Ok(duplicate_receipt(&existing));
        }

        let new_order = draft.new_order();
        let order = match self.store.insert_order(&new_order).await? {
            InsertOutcome::Inserted(order) => order,
            InsertOutcome::Conflict => {
                let winner = self
                    .store
                    .find_by_payment_intent(&draft.payment_intent_id)
                    .await?
                    .ok_or_else(|| {
                        error!(
                            payment_intent_id = %draft.payment_intent_id,
                            "insert conflicted but no order holds the payment intent"
                        );
                        AppError::new(AppErrorKind::Infrastructure(
                            InfrastructureError::Database {
                                message: "conflicting order not found".to_string(),
                                is_retryable: true,
                            },
                        ))
                    })?;
                info!(
                    order_number = %winner.order_number,
                    payment_intent_id = %draft.payment_intent_id,
                    source = draft.source.as_str(),
                    "lost order insert race, returning existing order"
                );
                return Ok(duplicate_receipt(&winner));
            }
        };

        if !draft.items.is_empty() {
            if let Err(e) = self.store.insert_items(order.id, &draft.items).await {
                warn!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    error = %e,
                    "failed to insert order items"
                );
            }
        }

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            payment_intent_id = %order.payment_intent_id,
            source = draft.source.as_str(),
            items = draft.items.len(),
            "order created"
        );

        Ok(OrderReceipt {
            success: true,
            order_number: order.order_number,
            order_id: order.id,
            duplicate: false,
        })
    }

    pub async fn find_order(&self, order_number: &str) -> AppResult<OrderSummary> {
        let normalized = sanitize_string(order_number, MAX_ORDER_NUMBER_LEN).to_uppercase();
        if normalized.is_empty() {
            return Err(AppError::validation("orderNumber", "Invalid order number"));
        }

        self.store
            .find_by_order_number(&normalized)
            .await?
            .map(OrderSummary::from)
            .ok_or_else(|| AppError::not_found("order", normalized))
    }

    /// Apply a fulfilment transition; the store rejects illegal ones.
    pub async fn update_status(&self, order_id: Uuid, next: OrderStatus) -> AppResult<Order> {
        let order = self.store.update_status(order_id, next).await?;
        info!(order_id = %order_id, status = %order.status, "order status updated");
        Ok(order)
    }
}
