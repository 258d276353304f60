//! Core domain types for the daybreak trading bot.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Symbol`, `Instrument`: universe reference data
//! - `Price`, `Quantity`: precision-safe numeric types
//! - `LiveQuote`, `BaselineSnapshot`, `FilterResult`, `ScoredCandidate`: per-day market data
//! - `Timetable`, `TradingCalendar`, `Clock`: wall-clock gating of the daily phases
//! - `DailyReport`: end-of-day aggregate

pub mod account;
pub mod calendar;
pub mod candidate;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod report;
pub mod timetable;

pub use account::{AccountBalance, Holding, QuotaUsage};
pub use calendar::{FixedHolidays, HolidayPredicate, NoHolidays, TradingCalendar};
pub use candidate::{FilterResult, ScoredCandidate, SubScores};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::{round_pct, Price, Quantity};
pub use error::{CoreError, Result};
pub use market::{BaselineSnapshot, DailyBar, Instrument, LiveQuote, Symbol};
pub use order::{OrderAck, OrderId, OrderKind, OrderRecord, OrderRequest, OrderSide};
pub use report::{AccountSnapshot, DailyReport, ExitKind, OrderSummary, TradeCounts};
pub use timetable::{PhaseId, Timetable};
