use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorEnvelope {
    error: ProcessorErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorBody {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self { client, timeout })
    }

    /// POST a form-encoded body and decode the JSON response. Single attempt:
    /// callers use this for non-idempotent creates.
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        provider: &str,
        url: &str,
        bearer_token: &str,
        form: &[(String, String)],
    ) -> PaymentResult<T> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .bearer_auth(bearer_token)
            .form(form)
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError {
                message: format!("{} request failed: {}", provider, e),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            return serde_json::from_str::<T>(&text).map_err(|e| PaymentError::ProviderError {
                provider: provider.to_string(),
                message: format!("invalid provider JSON response: {}", e),
                provider_code: None,
                retryable: false,
            });
        }

        Err(classify_error_response(provider, status.as_u16(), &text))
    }
}

/// Map a non-2xx processor response onto a [`PaymentError`].
pub fn classify_error_response(provider: &str, status: u16, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<ProcessorErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);
    let message = parsed
        .as_ref()
        .and_then(|err| err.message.clone())
        .unwrap_or_else(|| format!("HTTP {}", status));

    if status == 429 {
        return PaymentError::RateLimitError {
            message,
            retry_after_seconds: None,
        };
    }

    if let Some(err) = &parsed {
        if err.error_type.as_deref() == Some("card_error") {
            return PaymentError::CardDeclined {
                message,
                decline_code: err.decline_code.clone().or_else(|| err.code.clone()),
            };
        }
        if err.error_type.as_deref() == Some("invalid_request_error") {
            return PaymentError::ValidationError {
                message,
                field: err.code.clone(),
            };
        }
    }

    PaymentError::ProviderError {
        provider: provider.to_string(),
        message,
        provider_code: parsed.and_then(|err| err.code).or(Some(status.to_string())),
        retryable: status >= 500,
    }
}

// ============================================================================
// Money
// ============================================================================

/// Round half away from zero to whole cents.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert major units to integer minor units, rounding half up.
pub fn to_minor_units(amount: Decimal) -> PaymentResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| PaymentError::ValidationError {
            message: format!("amount {} does not fit in minor units", amount),
            field: Some("amount".to_string()),
        })
}

/// Two-decimal string as stored in processor metadata.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", round_cents(amount))
}

// ============================================================================
// Webhook signatures
// ============================================================================

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

pub fn parse_signature_header(header: &str) -> PaymentResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.trim().parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value.trim().to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| PaymentError::WebhookVerificationError {
        message: "signature header missing timestamp".to_string(),
    })?;
    if signatures.is_empty() {
        return Err(PaymentError::WebhookVerificationError {
            message: "signature header missing v1 signature".to_string(),
        });
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn compute_signature(payload: &[u8], timestamp: i64, secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature header against the raw body, rejecting timestamps
/// further than `tolerance_secs` from `now`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> PaymentResult<()> {
    let parsed = parse_signature_header(header)?;

    if now.abs_diff(parsed.timestamp) > tolerance_secs.unsigned_abs() {
        return Err(PaymentError::WebhookVerificationError {
            message: format!(
                "timestamp {} outside tolerance of {}s",
                parsed.timestamp, tolerance_secs
            ),
        });
    }

    let expected = compute_signature(payload, parsed.timestamp, secret);
    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| secure_eq(expected.as_bytes(), candidate.as_bytes()));

    if matched {
        Ok(())
    } else {
        Err(PaymentError::WebhookVerificationError {
            message: "no matching v1 signature".to_string(),
        })
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
