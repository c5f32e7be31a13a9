use serde::{Deserialize, Serialize};

use crate::calendar::AdjustmentMode;
use crate::delinquency::DelinquencyConfig;
use crate::ecl::EclConfig;
use crate::errors::{LoanError, Result};
use crate::interest::DayCountConvention;

/// engine-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// convention applied when a product does not name one
    pub day_count_default: DayCountConvention,
    pub business_day_mode: AdjustmentMode,
    /// decimal places carried by rates
    pub rate_precision: u32,
    /// decimal places carried by money, rounded half-up
    pub money_precision: u32,
    /// parallel workers for batch orchestration
    pub worker_pool_size: usize,
    pub delinquency: DelinquencyConfig,
    pub ecl: EclConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            day_count_default: DayCountConvention::Act365,
            business_day_mode: AdjustmentMode::ModifiedFollowing,
            rate_precision: crate::decimal::RATE_DP,
            money_precision: crate::decimal::MONEY_DP,
            worker_pool_size: 8,
            delinquency: DelinquencyConfig::default(),
            ecl: EclConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(LoanError::invalid_input("worker pool size must be positive"));
        }
        let (sma0, sma1, sma2) = self.delinquency.sma_boundaries;
        if !(sma0 < sma1 && sma1 < sma2) {
            return Err(LoanError::invalid_input("SMA boundaries must be strictly increasing"));
        }
        if self.delinquency.npa_trigger_dpd < sma2 {
            return Err(LoanError::invalid_input("NPA trigger must not undercut SMA-2"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = EngineConfig::default();
        config.worker_pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unordered_sma_boundaries() {
        let mut config = EngineConfig::default();
        config.delinquency.sma_boundaries = (60, 30, 90);
        assert!(config.validate().is_err());
    }
}
