//! Phase 2 change-rate band filter.
//!
//! Each pass re-evaluates every sampled instrument from scratch; the caller
//! replaces the previous outcome rather than merging into it.

use daybreak_core::{round_pct, BaselineSnapshot, FilterResult, LiveQuote};
use rust_decimal::Decimal;
use tracing::trace;

use crate::config::FilterConfig;

/// Result of one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Every instrument with a usable sample, pass or fail.
    pub evaluated: Vec<FilterResult>,
    /// In-band instruments, change rate descending, capped at top-K.
    pub passed: Vec<FilterResult>,
}

impl FilterOutcome {
    /// Number of in-band instruments before the top-K cap.
    #[must_use]
    pub fn qualified(&self) -> usize {
        self.evaluated.iter().filter(|r| r.passed).count()
    }
}

/// Inclusive `[lo, hi]` percent-change band with a top-K cap.
#[derive(Debug, Clone)]
pub struct BandFilter {
    lo: Decimal,
    hi: Decimal,
    top_k: usize,
}

impl BandFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            lo: config.band_lo_pct,
            hi: config.band_hi_pct,
            top_k: config.top_k,
        }
    }

    #[must_use]
    pub fn contains(&self, change_pct: Decimal) -> bool {
        self.lo <= change_pct && change_pct <= self.hi
    }

    /// Evaluate one instrument. `None` if either price is unusable.
    pub fn evaluate_one(&self, baseline: &BaselineSnapshot, quote: &LiveQuote) -> Option<FilterResult> {
        if !quote.price.is_positive() {
            return None;
        }
        let change_pct = round_pct(quote.price.pct_from(baseline.prior_close)?);
        Some(FilterResult {
            symbol: baseline.symbol.clone(),
            name: baseline.name.clone(),
            prior_close: baseline.prior_close,
            current_price: quote.price,
            change_pct,
            volume: quote.volume,
            traded_value: quote.traded_value,
            prior_volume: baseline.prior_volume,
            passed: self.contains(change_pct),
        })
    }

    /// Run a full pass over `(baseline, quote)` samples.
    pub fn evaluate<'a, I>(&self, samples: I) -> FilterOutcome
    where
        I: IntoIterator<Item = (&'a BaselineSnapshot, &'a LiveQuote)>,
    {
        let evaluated: Vec<FilterResult> = samples
            .into_iter()
            .filter_map(|(baseline, quote)| {
                let result = self.evaluate_one(baseline, quote);
                if result.is_none() {
                    trace!(symbol = %baseline.symbol, "Skipping sample with unusable price");
                }
                result
            })
            .collect();

        let mut passed: Vec<FilterResult> = evaluated.iter().filter(|r| r.passed).cloned().collect();
        passed.sort_by(|a, b| {
            b.change_pct
                .cmp(&a.change_pct)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        passed.truncate(self.top_k);

        FilterOutcome { evaluated, passed }
    }
}
