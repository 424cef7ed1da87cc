use crate::config::{env_or, ConfigError};
use crate::payments::error::PaymentResult;
use crate::payments::provider::PaymentProcessor;
use crate::payments::types::{PaymentIntent, PaymentIntentRequest, WebhookEvent};
use crate::payments::utils::{verify_signature, PaymentHttpClient};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub const PROVIDER_NAME: &str = "stripe";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Connect account receiving transfers; only used when it looks valid
    pub connected_account_id: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
    pub webhook_tolerance_secs: i64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: String::new(),
            connected_account_id: None,
            api_base: "https://api.stripe.com".to_string(),
            timeout_secs: 30,
            webhook_tolerance_secs: 300,
        }
    }
}

impl StripeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| ConfigError::MissingVariable("STRIPE_SECRET_KEY".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| ConfigError::MissingVariable("STRIPE_WEBHOOK_SECRET".to_string()))?;

        Ok(Self {
            secret_key,
            webhook_secret,
            connected_account_id: std::env::var("STRIPE_CONNECTED_ACCOUNT_ID")
                .ok()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            timeout_secs: env_or("STRIPE_TIMEOUT_SECS", "30")?,
            webhook_tolerance_secs: env_or("STRIPE_WEBHOOK_TOLERANCE_SECS", "300")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue("STRIPE_SECRET_KEY".to_string()));
        }
        if self.webhook_secret.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "STRIPE_WEBHOOK_SECRET".to_string(),
            ));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "STRIPE_API_BASE must be a valid URL".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("STRIPE_TIMEOUT_SECS".to_string()));
        }
        if self.webhook_tolerance_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "STRIPE_WEBHOOK_TOLERANCE_SECS".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct StripeProvider {
    config: StripeConfig,
    http: PaymentHttpClient,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }
}

/// Flatten a request into Stripe's bracketed form encoding.
pub fn form_params(request: &PaymentIntentRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("amount".to_string(), request.amount.to_string()),
        ("currency".to_string(), request.currency.clone()),
        ("description".to_string(), request.description.clone()),
    ];

    if request.automatic_payment_methods {
        params.push((
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string(),
        ));
    }

    if let Some(email) = &request.receipt_email {
        params.push(("receipt_email".to_string(), email.clone()));
    }

    for (key, value) in &request.metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
    }

    if let Some(split) = &request.fee_split {
        params.push((
            "application_fee_amount".to_string(),
            split.application_fee_amount.to_string(),
        ));
        params.push((
            "transfer_data[destination]".to_string(),
            split.destination.clone(),
        ));
    }

    params
}

#[async_trait]
impl PaymentProcessor for StripeProvider {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> PaymentResult<PaymentIntent> {
        let params = form_params(&request);
        debug!(
            amount = request.amount,
            currency = %request.currency,
            split = request.fee_split.is_some(),
            "creating stripe payment intent"
        );

        let intent: PaymentIntent = self
            .http
            .post_form(
                PROVIDER_NAME,
                &self.endpoint("/v1/payment_intents"),
                &self.config.secret_key,
                &params,
            )
            .await?;

        info!(payment_intent_id = %intent.id, amount = intent.amount, "stripe payment intent created");
        Ok(intent)
    }

    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> PaymentResult<WebhookEvent> {
        verify_signature(
            payload,
            signature_header,
            &self.config.webhook_secret,
            self.config.webhook_tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;

        serde_json::from_slice::<WebhookEvent>(payload).map_err(|e| {
            crate::payments::error::PaymentError::WebhookPayloadError {
                message: format!("invalid event JSON: {}", e),
            }
        })
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}
