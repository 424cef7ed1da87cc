//! Creates the processor authorization for a reconciled cart.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::CheckoutConfig;
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::models::cart::{ValidatedCustomer, VerifiedItem};
use crate::payments::provider::PaymentProcessor;
use crate::payments::types::{FeeSplit, PaymentIntentRequest};
use crate::payments::utils::{format_amount, round_cents, to_minor_units};
use crate::services::cart_validator::{sanitize_string, MAX_INSTRUCTIONS_LEN};
use crate::services::order_snapshot::{encode_snapshot, SnapshotEncoding, METADATA_VALUE_LIMIT};
use crate::services::price_reconciliation::Reconciliation;

pub const DESCRIPTION_PREFIX: &str = "Blackbird order: ";
const DESCRIPTION_ITEMS_LIMIT: usize = 500;
const DESCRIPTION_NAME_LEN: usize = 50;
const DESCRIPTION_OPTION_LEN: usize = 20;
const IMPLICIT_SIZES: [&str; 2] = ["regular", "standard"];

/// Metadata keys shared with the webhook path.
pub mod metadata_keys {
    pub const CUSTOMER_NAME: &str = "customer_name";
    pub const CUSTOMER_EMAIL: &str = "customer_email";
    pub const CUSTOMER_PHONE: &str = "customer_phone";
    pub const INSTRUCTIONS: &str = "instructions";
    pub const ITEM_COUNT: &str = "item_count";
    pub const SUBTOTAL: &str = "subtotal";
    pub const TAX: &str = "tax";
    pub const TOTAL: &str = "total";
    pub const PLATFORM_FEE: &str = "platform_fee";
    pub const ITEMS: &str = "items";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub platform_fee: Decimal,
}

/// `tax` is rounded to cents and `total = subtotal + tax`.
pub fn compute_totals(subtotal: Decimal, platform_fee: Decimal, tax_rate: Decimal) -> OrderTotals {
    let subtotal = round_cents(subtotal);
    let tax = round_cents(subtotal * tax_rate);
    OrderTotals {
        subtotal,
        tax,
        total: subtotal + tax,
        platform_fee: round_cents(platform_fee),
    }
}

fn describe_item(item: &VerifiedItem) -> String {
    let mut line = format!(
        "{}x {}",
        item.quantity,
        sanitize_string(&item.product_name, DESCRIPTION_NAME_LEN)
    );

    if let Some(size) = &item.size_name {
        if !IMPLICIT_SIZES.contains(&size.trim().to_lowercase().as_str()) {
            line.push_str(&format!(
                " ({})",
                sanitize_string(size, DESCRIPTION_OPTION_LEN)
            ));
        }
    }

    if !item.modifiers.is_empty() {
        let names: Vec<String> = item
            .modifiers
            .iter()
            .map(|m| sanitize_string(&m.name, DESCRIPTION_OPTION_LEN))
            .collect();
        line.push_str(&format!(" - {}", names.join(", ")));
    }

    line
}

/// `"Blackbird order: 2x Latte - Oat Milk; 1x Saga #1"`; the item list is
/// capped at 500 characters.
pub fn build_description(items: &[VerifiedItem]) -> String {
    let joined = items
        .iter()
        .map(describe_item)
        .collect::<Vec<_>>()
        .join("; ");
    let capped: String = joined.chars().take(DESCRIPTION_ITEMS_LIMIT).collect();
    format!("{}{}", DESCRIPTION_PREFIX, capped)
}

pub fn build_metadata(
    customer: &ValidatedCustomer,
    instructions: Option<&str>,
    totals: &OrderTotals,
    items: &[VerifiedItem],
) -> Result<(BTreeMap<String, String>, SnapshotEncoding), serde_json::Error> {
    use metadata_keys::*;

    let (encoding, snapshot) = encode_snapshot(items, METADATA_VALUE_LIMIT)?;
    let cap = |value: &str| -> String { value.chars().take(METADATA_VALUE_LIMIT).collect() };

    let metadata = BTreeMap::from([
        (CUSTOMER_NAME.to_string(), cap(&customer.name)),
        (CUSTOMER_EMAIL.to_string(), cap(&customer.email)),
        (
            CUSTOMER_PHONE.to_string(),
            customer.phone.clone().unwrap_or_default(),
        ),
        (
            INSTRUCTIONS.to_string(),
            sanitize_string(instructions.unwrap_or_default(), MAX_INSTRUCTIONS_LEN),
        ),
        (ITEM_COUNT.to_string(), items.len().to_string()),
        (SUBTOTAL.to_string(), format_amount(totals.subtotal)),
        (TAX.to_string(), format_amount(totals.tax)),
        (TOTAL.to_string(), format_amount(totals.total)),
        (PLATFORM_FEE.to_string(), format_amount(totals.platform_fee)),
        (ITEMS.to_string(), snapshot),
    ]);

    Ok((metadata, encoding))
}

/// A connected account is used only when it looks like a real one.
pub fn valid_connected_account(id: Option<&str>) -> Option<&str> {
    id.map(str::trim)
        .filter(|id| id.starts_with("acct_") && id.len() > 10)
}

/// What the storefront needs to confirm the payment.
#[derive(Debug, Clone)]
pub struct IssuedPayment {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub totals: OrderTotals,
    pub amount_minor: i64,
    pub snapshot_encoding: SnapshotEncoding,
}

#[derive(Clone)]
pub struct PaymentIntentIssuer {
    processor: Arc<dyn PaymentProcessor>,
    checkout: CheckoutConfig,
    connected_account_id: Option<String>,
}

impl PaymentIntentIssuer {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        checkout: CheckoutConfig,
        connected_account_id: Option<String>,
    ) -> Self {
        let connected_account_id =
            valid_connected_account(connected_account_id.as_deref()).map(str::to_string);
        if let Some(account) = &connected_account_id {
            info!(account = %account, "payment intents will split fees to connected account");
        } else {
            info!("payment intents will be direct charges");
        }

        Self {
            processor,
            checkout,
            connected_account_id,
        }
    }

    /// Assemble the processor request without sending it.
    pub fn prepare(
        &self,
        customer: &ValidatedCustomer,
        instructions: Option<&str>,
        reconciliation: &Reconciliation,
    ) -> AppResult<(PaymentIntentRequest, OrderTotals, SnapshotEncoding)> {
        let totals = compute_totals(
            reconciliation.subtotal,
            reconciliation.platform_fee,
            self.checkout.tax_rate,
        );

        if totals.total < self.checkout.min_order_total
            || totals.total > self.checkout.max_order_total
        {
            return Err(AppError::new(AppErrorKind::Domain(
                DomainError::AmountOutOfRange {
                    total: totals.total,
                    min: self.checkout.min_order_total,
                    max: self.checkout.max_order_total,
                },
            )));
        }

        let amount = to_minor_units(totals.total)?;
        let (metadata, encoding) =
            build_metadata(customer, instructions, &totals, &reconciliation.items).map_err(
                |e| {
                    error!(error = %e, "failed to encode order snapshot");
                    AppError::upstream("stripe", e.to_string())
                },
            )?;

        if encoding != SnapshotEncoding::Full {
            warn!(
                encoding = encoding.as_str(),
                items = reconciliation.items.len(),
                "order snapshot degraded to fit metadata limit"
            );
        }

        let fee_split = match &self.connected_account_id {
            Some(destination) => Some(FeeSplit {
                application_fee_amount: to_minor_units(totals.platform_fee)?,
                destination: destination.clone(),
            }),
            None => None,
        };

        let request = PaymentIntentRequest {
            amount,
            currency: self.checkout.currency.clone(),
            description: build_description(&reconciliation.items),
            receipt_email: Some(customer.email.clone()),
            metadata,
            fee_split,
            automatic_payment_methods: true,
        };

        Ok((request, totals, encoding))
    }

    pub async fn issue(
        &self,
        customer: &ValidatedCustomer,
        instructions: Option<&str>,
        reconciliation: &Reconciliation,
    ) -> AppResult<IssuedPayment> {
        let (request, totals, snapshot_encoding) =
            self.prepare(customer, instructions, reconciliation)?;
        let amount_minor = request.amount;

        let intent = self
            .processor
            .create_payment_intent(request)
            .await
            .map_err(|e| {
                error!(
                    provider = self.processor.name(),
                    error = %e,
                    "payment intent creation failed"
                );
                AppError::from(e)
            })?;

        let client_secret = intent.client_secret.clone().ok_or_else(|| {
            AppError::upstream(
                self.processor.name(),
                format!("payment intent {} returned without client secret", intent.id),
            )
        })?;

        Ok(IssuedPayment {
            client_secret,
            payment_intent_id: intent.id,
            totals,
            amount_minor,
            snapshot_encoding,
        })
    }
}
