//! Candidate selection for the daybreak trading bot.
//!
//! - `BandFilter`: Phase 2 re-filtering of live quotes against a change-rate band
//! - `CandidateScorer`: Phase 3 composite scoring and top-N selection

pub mod config;
pub mod error;
pub mod filter;
pub mod scoring;

pub use config::{FilterConfig, ScoringConfig, ScoringWeights};
pub use error::{StrategyError, StrategyResult};
pub use filter::{BandFilter, FilterOutcome};
pub use scoring::{normalize, normalize_log, CandidateScorer};
