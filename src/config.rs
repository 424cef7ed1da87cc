//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use crate::error::{AppError, AppErrorKind, InfrastructureError};
use crate::payments::providers::stripe::StripeConfig;
use crate::services::platform_fee::FeeSchedule;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub checkout: CheckoutConfig,
    pub stripe: StripeConfig,
    pub rate_limits: RateLimitSettings,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub run_migrations: bool,
}

/// Shared rate-limit store. Without a Redis URL each instance limits locally.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Pricing and order-total rules applied at checkout
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub tax_rate: Decimal,
    pub min_order_total: Decimal,
    pub max_order_total: Decimal,
    pub price_tolerance: Decimal,
    pub currency: String,
    pub max_cart_items: usize,
    pub fees: FeeSchedule,
}

/// Requests allowed per client IP per window, by route family
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub checkout: u32,
    pub orders: u32,
    pub webhook: u32,
    pub api: u32,
    pub window_secs: u64,
    pub sweep_interval_secs: u64,
}

/// Read `name`, falling back to `default`, and parse it.
pub(crate) fn env_or<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
            stripe: StripeConfig::from_env()?,
            rate_limits: RateLimitSettings::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.cache.validate()?;
        self.logging.validate()?;
        self.checkout.validate()?;
        self.stripe.validate()?;
        self.rate_limits.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_or("SERVER_PORT", "8000")?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env_or("DB_MAX_CONNECTIONS", "20")?,
            min_connections: env_or("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: env_or("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
            run_migrations: env_or("RUN_MIGRATIONS", "false")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CacheConfig {
            redis_url: env::var("REDIS_URL")
                .ok()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            max_connections: env_or("CACHE_MAX_CONNECTIONS", "10")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(ConfigError::InvalidValue(
                    "REDIS_URL must start with redis:// or rediss://".to_string(),
                ));
            }
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "CACHE_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(6, 2),
            min_order_total: Decimal::new(50, 2),
            max_order_total: Decimal::new(10_000, 0),
            price_tolerance: Decimal::new(2, 2),
            currency: "usd".to_string(),
            max_cart_items: 50,
            fees: FeeSchedule::default(),
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CheckoutConfig {
            tax_rate: env_or("TAX_RATE", "0.06")?,
            min_order_total: env_or("MIN_ORDER_TOTAL", "0.50")?,
            max_order_total: env_or("MAX_ORDER_TOTAL", "10000")?,
            price_tolerance: env_or("PRICE_TOLERANCE", "0.02")?,
            currency: env::var("CURRENCY")
                .unwrap_or_else(|_| "usd".to_string())
                .trim()
                .to_lowercase(),
            max_cart_items: env_or("MAX_CART_ITEMS", "50")?,
            fees: FeeSchedule::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tax_rate < Decimal::ZERO || self.tax_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidValue(
                "TAX_RATE must be in [0, 1)".to_string(),
            ));
        }

        if self.min_order_total <= Decimal::ZERO || self.min_order_total >= self.max_order_total
        {
            return Err(ConfigError::InvalidValue(
                "MIN_ORDER_TOTAL must be positive and below MAX_ORDER_TOTAL".to_string(),
            ));
        }

        if self.price_tolerance < Decimal::ZERO {
            return Err(ConfigError::InvalidValue("PRICE_TOLERANCE".to_string()));
        }

        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(ConfigError::InvalidValue(
                "CURRENCY must be a 3-letter ISO code".to_string(),
            ));
        }

        if self.max_cart_items == 0 {
            return Err(ConfigError::InvalidValue("MAX_CART_ITEMS".to_string()));
        }

        self.fees.validate()
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            checkout: 10,
            orders: 5,
            webhook: 100,
            api: 60,
            window_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(RateLimitSettings {
            checkout: env_or("RATE_LIMIT_CHECKOUT", "10")?,
            orders: env_or("RATE_LIMIT_ORDERS", "5")?,
            webhook: env_or("RATE_LIMIT_WEBHOOK", "100")?,
            api: env_or("RATE_LIMIT_API", "60")?,
            window_secs: env_or("RATE_LIMIT_WINDOW_SECS", "60")?,
            sweep_interval_secs: env_or("RATE_LIMIT_SWEEP_SECS", "60")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_WINDOW_SECS".to_string(),
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_SWEEP_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}
