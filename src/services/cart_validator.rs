//! Structural validation and sanitization of untrusted checkout input.
//!
//! Everything here is pure: no catalog access and no side effects. Pricing
//! is checked afterwards by the price reconciler.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::{AppError, AppErrorKind, AppResult, ValidationError};
use crate::models::cart::{
    CartItem, CheckoutRequest, CustomerInput, ValidatedCartItem, ValidatedCheckout,
    ValidatedCustomer,
};

pub const MAX_NAME_LEN: usize = 100;
pub const MIN_NAME_LEN: usize = 2;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_INSTRUCTIONS_LEN: usize = 500;
pub const MAX_PHONE_INPUT_LEN: usize = 20;
pub const MIN_QUANTITY: u32 = 1;
pub const MAX_QUANTITY: u32 = 99;
/// Upper bound for any single money field accepted from a client.
pub const MAX_CLIENT_AMOUNT: f64 = 100_000.0;

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid regex"));
static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));
static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon\w+\s*=").expect("valid regex"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Trim, cap at `max_chars` characters, then strip control characters,
/// `<script>` blocks and inline event handler prefixes.
pub fn sanitize_string(input: &str, max_chars: usize) -> String {
    let truncated: String = input.trim().chars().take(max_chars).collect();
    let without_controls = CONTROL_CHARS.replace_all(&truncated, "");
    let without_scripts = SCRIPT_BLOCK.replace_all(&without_controls, "");
    EVENT_HANDLER.replace_all(&without_scripts, "").into_owned()
}

/// Sanitize optional free text, mapping empty results to `None`.
pub fn sanitize_optional(input: Option<&str>, max_chars: usize) -> Option<String> {
    input
        .map(|value| sanitize_string(value, max_chars))
        .filter(|value| !value.is_empty())
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && EMAIL.is_match(email)
}

/// Keep only digits and common phone punctuation, capped in length.
pub fn sanitize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(*c, '+' | '-' | '(' | ')' | '.'))
        .take(MAX_PHONE_INPUT_LEN)
        .collect()
}

/// Strip formatting from a sanitized phone; valid when 10 to 15 digits remain.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone
        .chars()
        .filter(|c| !(c.is_whitespace() || matches!(*c, '-' | '(' | ')' | '.' | '+')))
        .collect();
    let valid = (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
    valid.then_some(digits)
}

/// Finite, non-negative and not absurdly large.
pub fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount >= 0.0 && amount <= MAX_CLIENT_AMOUNT
}

pub fn validate_customer(customer: Option<&CustomerInput>) -> AppResult<ValidatedCustomer> {
    let customer =
        customer.ok_or_else(|| AppError::validation("customer", "Invalid customer data"))?;

    let name = customer.name.as_deref().unwrap_or_default().trim();
    if name.chars().count() < MIN_NAME_LEN {
        return Err(AppError::validation(
            "customer.name",
            "Name must be at least 2 characters",
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation("customer.name", "Name is too long"));
    }

    let email = customer.email.as_deref().unwrap_or_default().trim();
    if !is_valid_email(email) {
        return Err(AppError::validation(
            "customer.email",
            "Invalid email address",
        ));
    }

    let phone = match customer.phone.as_deref().map(sanitize_phone) {
        Some(cleaned) if !cleaned.trim().is_empty() => Some(normalize_phone(&cleaned).ok_or_else(
            || AppError::validation("customer.phone", "Invalid phone number"),
        )?),
        _ => None,
    };

    Ok(ValidatedCustomer {
        name: sanitize_string(name, MAX_NAME_LEN),
        email: email.to_lowercase(),
        phone,
    })
}

fn validate_quantity(quantity: Option<f64>) -> Option<u32> {
    let quantity = quantity?;
    let in_range = quantity.is_finite()
        && quantity.fract() == 0.0
        && quantity >= MIN_QUANTITY as f64
        && quantity <= MAX_QUANTITY as f64;
    in_range.then_some(quantity as u32)
}

fn validate_item(index: usize, item: &CartItem) -> AppResult<ValidatedCartItem> {
    let field = |name: &str| format!("items[{}].{}", index, name);

    let quantity = validate_quantity(item.quantity)
        .ok_or_else(|| AppError::validation(field("quantity"), "Invalid item quantity"))?;

    let product_ref = item
        .product
        .as_ref()
        .and_then(|product| product.id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
                field: field("product.id"),
            }))
        })?;

    let client_unit_price = item
        .unit_price
        .filter(|price| {
            *price >= Decimal::ZERO && *price <= Decimal::from(MAX_CLIENT_AMOUNT as i64)
        })
        .ok_or_else(|| AppError::validation(field("unitPrice"), "Invalid item price"))?;

    let size_name = item
        .size
        .as_ref()
        .map(|size| size.name.trim().to_string())
        .filter(|name| !name.is_empty());

    let modifier_names = item
        .modifiers
        .iter()
        .map(|modifier| modifier.name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    Ok(ValidatedCartItem {
        product_ref: product_ref.to_string(),
        size_name,
        modifier_names,
        quantity,
        client_unit_price,
    })
}

/// Validate a checkout request. Checks run in a fixed order (items present,
/// item count, customer, then each line) so the first failure is reported.
pub fn validate_checkout_request(
    request: &CheckoutRequest,
    max_items: usize,
) -> AppResult<ValidatedCheckout> {
    let items = match request.items.as_deref() {
        Some(items) if !items.is_empty() => items,
        _ => return Err(AppError::new(AppErrorKind::Validation(ValidationError::EmptyCart))),
    };

    if items.len() > max_items {
        return Err(AppError::new(AppErrorKind::Validation(
            ValidationError::TooManyItems {
                count: items.len(),
                max: max_items,
            },
        )));
    }

    let customer = validate_customer(request.customer.as_ref())?;

    let items = items
        .iter()
        .enumerate()
        .map(|(index, item)| validate_item(index, item))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ValidatedCheckout {
        customer,
        items,
        instructions: sanitize_optional(request.instructions.as_deref(), MAX_INSTRUCTIONS_LEN),
    })
}
