//! Filter and scoring configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{StrategyError, StrategyResult};

/// Tolerance for the weights-sum-to-one check.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Phase 2 change-rate band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Lower bound of the band, in percent (inclusive).
    #[serde(default = "default_band_lo_pct")]
    pub band_lo_pct: Decimal,
    /// Upper bound of the band, in percent (inclusive).
    #[serde(default = "default_band_hi_pct")]
    pub band_hi_pct: Decimal,
    /// Maximum number of survivors kept per pass.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_band_lo_pct() -> Decimal {
    Decimal::from(2)
}

fn default_band_hi_pct() -> Decimal {
    Decimal::from(4)
}

fn default_top_k() -> usize {
    10
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            band_lo_pct: default_band_lo_pct(),
            band_hi_pct: default_band_hi_pct(),
            top_k: default_top_k(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> StrategyResult<()> {
        if self.band_lo_pct > self.band_hi_pct {
            return Err(StrategyError::ConfigError(format!(
                "band_lo_pct ({}) must not exceed band_hi_pct ({})",
                self.band_lo_pct, self.band_hi_pct
            )));
        }
        if self.top_k == 0 {
            return Err(StrategyError::ConfigError(
                "top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Midpoint of the band.
    #[must_use]
    pub fn center(&self) -> Decimal {
        (self.band_lo_pct + self.band_hi_pct) / Decimal::TWO
    }
}

/// Composite score weights. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub change_rate: f64,
    pub volume: f64,
    pub traded_value: f64,
    pub stability: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            change_rate: 0.35,
            volume: 0.25,
            traded_value: 0.20,
            stability: 0.20,
        }
    }
}

impl ScoringWeights {
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.change_rate + self.volume + self.traded_value + self.stability
    }
}

/// Phase 3 scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
    /// Stability points lost per percentage point away from the band center.
    #[serde(default = "default_stability_slope")]
    pub stability_slope: f64,
    /// Number of candidates handed to buy execution.
    #[serde(default = "default_max_selected")]
    pub max_selected: usize,
}

fn default_stability_slope() -> f64 {
    50.0
}

fn default_max_selected() -> usize {
    3
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            stability_slope: default_stability_slope(),
            max_selected: default_max_selected(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> StrategyResult<()> {
        let w = &self.weights;
        if [w.change_rate, w.volume, w.traded_value, w.stability]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(StrategyError::ConfigError(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if (w.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(StrategyError::ConfigError(format!(
                "scoring weights must sum to 1.0, got {}",
                w.sum()
            )));
        }
        if !self.stability_slope.is_finite() || self.stability_slope < 0.0 {
            return Err(StrategyError::ConfigError(format!(
                "stability_slope ({}) must be non-negative",
                self.stability_slope
            )));
        }
        if self.max_selected == 0 {
            return Err(StrategyError::ConfigError(
                "max_selected must be at least 1".to_string(),
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
    fn test_defaults_validate() {
        assert!(FilterConfig::default().validate().is_ok());
        assert!(ScoringConfig::default().validate().is_ok());
        assert_eq!(FilterConfig::default().center(), dec!(3));
    }

    #[test]
    fn test_inverted_band_rejected() {
        let config = FilterConfig {
            band_lo_pct: dec!(4),
            band_hi_pct: dec!(2),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let config = ScoringConfig {
            weights: ScoringWeights {
                change_rate: 0.5,
                volume: 0.25,
                traded_value: 0.20,
                stability: 0.20,
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_zero_selection_rejected() {
        let config = ScoringConfig {
            max_selected: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
