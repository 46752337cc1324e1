//! Configuration for the payout engine

use ledger_core::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payout engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Settlement currency
    pub currency: Currency,

    /// Smallest withdrawable amount (CLP 5000 by policy)
    pub min_withdrawal: Decimal,

    /// Processing fee rate withheld from each payout (0.02 = 2%)
    pub processing_fee_rate: Decimal,

    /// Timeout applied to each gateway transfer call (seconds)
    pub gateway_timeout_secs: u64,

    /// Transfer attempts per payout before manual-review escalation
    pub max_transfer_attempts: u32,

    /// How long a payout may sit in Processing before reconciliation
    /// picks it up (seconds)
    pub reconcile_after_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currency: Currency::CLP,
            min_withdrawal: Decimal::from(5_000),
            processing_fee_rate: Decimal::new(2, 2), // 0.02
            gateway_timeout_secs: 30,
            max_transfer_attempts: 3,
            reconcile_after_secs: 900,
        }
    }
}

impl Config {
    /// Gateway call timeout
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Reconciliation staleness threshold
    pub fn reconcile_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reconcile_after_secs as i64)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(min) = std::env::var("PAYOUT_MIN_WITHDRAWAL") {
            config.min_withdrawal = min
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad PAYOUT_MIN_WITHDRAWAL: {}", min)))?;
        }
        if let Ok(rate) = std::env::var("PAYOUT_FEE_RATE") {
            config.processing_fee_rate = rate
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad PAYOUT_FEE_RATE: {}", rate)))?;
        }
        if let Ok(timeout) = std::env::var("PAYOUT_GATEWAY_TIMEOUT_SECS") {
            config.gateway_timeout_secs = timeout.parse().map_err(|_| {
                crate::Error::Config(format!("Bad PAYOUT_GATEWAY_TIMEOUT_SECS: {}", timeout))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sanity-check the policy values
    pub fn validate(&self) -> crate::Result<()> {
        if self.min_withdrawal <= Decimal::ZERO {
            return Err(crate::Error::Config(
                "min_withdrawal must be positive".to_string(),
            ));
        }
        if self.processing_fee_rate < Decimal::ZERO || self.processing_fee_rate >= Decimal::ONE {
            return Err(crate::Error::Config(
                "processing_fee_rate must be in [0, 1)".to_string(),
            ));
        }
        if self.max_transfer_attempts == 0 {
            return Err(crate::Error::Config(
                "max_transfer_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.currency, Currency::CLP);
        assert_eq!(config.min_withdrawal, Decimal::from(5_000));
        assert_eq!(config.processing_fee_rate, Decimal::new(2, 2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_rate() {
        let mut config = Config::default();
        config.processing_fee_rate = Decimal::from(2);
        assert!(config.validate().is_err());

        config.processing_fee_rate = Decimal::from(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.max_transfer_attempts = 0;
        assert!(config.validate().is_err());
    }
}
