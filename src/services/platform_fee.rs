//! Tiered platform fee rates by product type.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::config::{env_or, ConfigError};
use crate::models::catalog::ProductType;

/// Fee rate per product type, with a fallback for types not listed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    rates: HashMap<ProductType, Decimal>,
    default_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        let rates = HashMap::from([
            (ProductType::Drink, Decimal::new(3, 2)),
            (ProductType::Food, Decimal::new(3, 2)),
            (ProductType::Comic, Decimal::new(15, 3)),
            (ProductType::Merchandise, Decimal::new(2, 2)),
        ]);
        Self {
            rates,
            default_rate: Decimal::new(25, 3),
        }
    }
}

impl FeeSchedule {
    pub fn new(rates: HashMap<ProductType, Decimal>, default_rate: Decimal) -> Self {
        Self {
            rates,
            default_rate,
        }
    }

    /// `PLATFORM_FEE_RATES` (`drink=0.03,comic=0.015`) overrides individual
    /// tiers of the default table; `PLATFORM_FEE_DEFAULT_RATE` replaces the
    /// fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut schedule = Self::default();
        schedule.default_rate = env_or("PLATFORM_FEE_DEFAULT_RATE", "0.025")?;

        if let Ok(raw) = env::var("PLATFORM_FEE_RATES") {
            for (product_type, rate) in Self::parse_rates(&raw)? {
                schedule.rates.insert(product_type, rate);
            }
        }

        Ok(schedule)
    }

    pub fn parse_rates(raw: &str) -> Result<Vec<(ProductType, Decimal)>, ConfigError> {
        raw.split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (name, rate) = pair.split_once('=').ok_or_else(|| {
                    ConfigError::InvalidValue(format!("PLATFORM_FEE_RATES entry '{}'", pair))
                })?;
                let product_type = ProductType::from_str(name)
                    .map_err(|e| ConfigError::InvalidValue(format!("PLATFORM_FEE_RATES: {}", e)))?;
                let rate = Decimal::from_str(rate.trim()).map_err(|_| {
                    ConfigError::InvalidValue(format!("PLATFORM_FEE_RATES rate '{}'", rate))
                })?;
                Ok((product_type, rate))
            })
            .collect()
    }

    pub fn rate_for(&self, product_type: ProductType) -> Decimal {
        self.rates
            .get(&product_type)
            .copied()
            .unwrap_or(self.default_rate)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |rate: &Decimal| *rate >= Decimal::ZERO && *rate < Decimal::ONE;
        if !in_range(&self.default_rate) || !self.rates.values().all(in_range) {
            return Err(ConfigError::ValidationFailed(
                "platform fee rates must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_tiers() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.rate_for(ProductType::Drink), dec!(0.03));
        assert_eq!(fees.rate_for(ProductType::Food), dec!(0.03));
        assert_eq!(fees.rate_for(ProductType::Comic), dec!(0.015));
        assert_eq!(fees.rate_for(ProductType::Merchandise), dec!(0.02));
    }

    #[test]
    fn test_untiered_types_use_default_rate() {
        let fees = FeeSchedule::new(HashMap::new(), dec!(0.025));
        assert_eq!(fees.rate_for(ProductType::Comic), dec!(0.025));
        assert_eq!(fees.rate_for(ProductType::Drink), dec!(0.025));
    }

    #[test]
    fn test_parse_rates() {
        let parsed = FeeSchedule::parse_rates("drink=0.04, comic = 0.01 ,").unwrap();
        assert_eq!(
            parsed,
            vec![
                (ProductType::Drink, dec!(0.04)),
                (ProductType::Comic, dec!(0.01))
            ]
        );
    }

    #[test]
    fn test_parse_rates_rejects_garbage() {
        assert!(FeeSchedule::parse_rates("drink").is_err());
        assert!(FeeSchedule::parse_rates("vinyl=0.1").is_err());
        assert!(FeeSchedule::parse_rates("food=lots").is_err());
    }

    #[test]
    fn test_validate_rejects_rate_of_one() {
        let fees = FeeSchedule::new(HashMap::from([(ProductType::Food, dec!(1))]), dec!(0.025));
        assert!(fees.validate().is_err());
        assert!(FeeSchedule::default().validate().is_ok());
    }
}
