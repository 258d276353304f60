//! Threshold-triggered exits.

use daybreak_core::ExitKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PositionError, PositionResult};

/// Exit thresholds in percent of entry price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Sell everything once return reaches this (positive).
    #[serde(default = "default_profit_target_pct")]
    pub profit_target_pct: Decimal,
    /// Sell everything once return falls to this (negative).
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
}

fn default_profit_target_pct() -> Decimal {
    Decimal::from(4)
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::from(-2)
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            profit_target_pct: default_profit_target_pct(),
            stop_loss_pct: default_stop_loss_pct(),
        }
    }
}

impl ExitConfig {
    pub fn validate(&self) -> PositionResult<()> {
        if self.profit_target_pct <= Decimal::ZERO {
            return Err(PositionError::InvalidState(format!(
                "profit_target_pct ({}) must be positive",
                self.profit_target_pct
            )));
        }
        if self.stop_loss_pct >= Decimal::ZERO {
            return Err(PositionError::InvalidState(format!(
                "stop_loss_pct ({}) must be negative",
                self.stop_loss_pct
            )));
        }
        Ok(())
    }
}

/// Profit-first, then stop-loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRule {
    profit_target_pct: Decimal,
    stop_loss_pct: Decimal,
}

impl ExitRule {
    pub fn new(config: &ExitConfig) -> Self {
        Self {
            profit_target_pct: config.profit_target_pct,
            stop_loss_pct: config.stop_loss_pct,
        }
    }

    #[must_use]
    pub fn evaluate(&self, return_pct: Decimal) -> Option<ExitKind> {
        if return_pct >= self.profit_target_pct {
            Some(ExitKind::TakeProfit)
        } else if return_pct <= self.stop_loss_pct {
            Some(ExitKind::StopLoss)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_thresholds_are_inclusive() {
        let rule = ExitRule::new(&ExitConfig::default());
        assert_eq!(rule.evaluate(dec!(4.1)), Some(ExitKind::TakeProfit));
        assert_eq!(rule.evaluate(dec!(4.0)), Some(ExitKind::TakeProfit));
        assert_eq!(rule.evaluate(dec!(3.99)), None);
        assert_eq!(rule.evaluate(dec!(0)), None);
        assert_eq!(rule.evaluate(dec!(-1.99)), None);
        assert_eq!(rule.evaluate(dec!(-2.0)), Some(ExitKind::StopLoss));
    }

    #[test]
    fn test_near_threshold_returns_do_not_trigger() {
        let rule = ExitRule::new(&ExitConfig::default());
        assert_eq!(rule.evaluate(dec!(3.996)), None);
        assert_eq!(rule.evaluate(dec!(-1.995)), None);
        assert_eq!(rule.evaluate(dec!(-2.001)), Some(ExitKind::StopLoss));
    }

    #[test]
    fn test_validate_rejects_wrong_signs() {
        let bad_target = ExitConfig {
            profit_target_pct: dec!(0),
            ..Default::default()
        };
        assert!(bad_target.validate().is_err());

        let bad_stop = ExitConfig {
            stop_loss_pct: dec!(1),
            ..Default::default()
        };
        assert!(bad_stop.validate().is_err());
        assert!(ExitConfig::default().validate().is_ok());
    }
}
