//! Phase 3 composite scoring.
//!
//! Sub-scores are each in `0..=100`:
//! - change rate: position of the change inside the filter band (min-max)
//! - volume, traded value: log10 min-max across the candidate set
//! - stability: distance from the band center, scaled by a slope
//!
//! The composite is their weighted sum rounded to 2 dp. Ranking is by score
//! descending with ties broken by symbol, so identical input always yields
//! the identical selection.

use std::cmp::Ordering;

use daybreak_core::{FilterResult, ScoredCandidate, SubScores};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::{FilterConfig, ScoringConfig, ScoringWeights};

/// Min-max normalize into `[0, 1]`; a degenerate range is neutral (0.5).
#[must_use]
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        return 0.5;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Log-scale min-max normalize into `[0, 1]`.
///
/// Non-positive values score 0. A degenerate range is neutral (0.5).
#[must_use]
pub fn normalize_log(value: f64, min: f64, max: f64) -> f64 {
    if value <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    let log = |v: f64| (v.max(0.0) + 1.0).log10();
    normalize(log(value), log(min), log(max))
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Ranks filter survivors and picks the day's selection.
#[derive(Debug, Clone)]
pub struct CandidateScorer {
    band_lo: f64,
    band_hi: f64,
    center: f64,
    weights: ScoringWeights,
    stability_slope: f64,
    max_selected: usize,
}

impl CandidateScorer {
    pub fn new(filter: &FilterConfig, scoring: &ScoringConfig) -> Self {
        Self {
            band_lo: to_f64(filter.band_lo_pct),
            band_hi: to_f64(filter.band_hi_pct),
            center: to_f64(filter.center()),
            weights: scoring.weights,
            stability_slope: scoring.stability_slope,
            max_selected: scoring.max_selected,
        }
    }

    /// Score every candidate and return them all, best first.
    pub fn rank(&self, candidates: &[FilterResult]) -> Vec<ScoredCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let volumes: Vec<f64> = candidates.iter().map(|c| c.volume as f64).collect();
        let values: Vec<f64> = candidates.iter().map(|c| to_f64(c.traded_value)).collect();
        let (vol_min, vol_max) = bounds(&volumes);
        let (val_min, val_max) = bounds(&values);

        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .zip(volumes.iter().zip(values.iter()))
            .map(|(candidate, (&volume, &value))| {
                let pct = to_f64(candidate.change_pct);
                let sub_scores = SubScores {
                    change_rate: normalize(pct, self.band_lo, self.band_hi) * 100.0,
                    volume: normalize_log(volume, vol_min, vol_max) * 100.0,
                    traded_value: normalize_log(value, val_min, val_max) * 100.0,
                    stability: self.stability(pct),
                };
                ScoredCandidate {
                    candidate: candidate.clone(),
                    sub_scores,
                    score: self.composite(&sub_scores),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.symbol().cmp(b.symbol()))
        });
        scored
    }

    /// Top `max_selected` of [`rank`](Self::rank).
    pub fn select(&self, candidates: &[FilterResult]) -> Vec<ScoredCandidate> {
        let mut ranked = self.rank(candidates);
        ranked.truncate(self.max_selected);
        for (i, c) in ranked.iter().enumerate() {
            debug!(
                rank = i + 1,
                symbol = %c.symbol(),
                score = c.score,
                change_pct = %c.candidate.change_pct,
                "Selected candidate"
            );
        }
        ranked
    }

    fn stability(&self, pct: f64) -> f64 {
        (100.0 - (pct - self.center).abs() * self.stability_slope).clamp(0.0, 100.0)
    }

    fn composite(&self, s: &SubScores) -> f64 {
        let w = &self.weights;
        let total = s.change_rate * w.change_rate
            + s.volume * w.volume
            + s.traded_value * w.traded_value
            + s.stability * w.stability;
        (total * 100.0).round() / 100.0
    }
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}
