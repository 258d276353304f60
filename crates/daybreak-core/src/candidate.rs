//! Pre-market filter and selection outputs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Price;
use crate::market::Symbol;

/// One instrument's pre-market change-rate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterResult {
    pub symbol: Symbol,
    pub name: String,
    pub prior_close: Price,
    pub current_price: Price,
    /// Percent change vs. prior close, rounded to 2 dp.
    pub change_pct: Decimal,
    pub volume: u64,
    pub traded_value: Decimal,
    pub prior_volume: u64,
    pub passed: bool,
}

/// Normalized sub-scores, each in `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub change_rate: f64,
    pub volume: f64,
    pub traded_value: f64,
    pub stability: f64,
}

/// A filter survivor enriched with its composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: FilterResult,
    pub sub_scores: SubScores,
    /// Weighted total, rounded to 2 dp.
    pub score: f64,
}

impl ScoredCandidate {
    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.candidate.symbol
    }
}
