//! Daybreak pre-market momentum bot.
//!
//! Wires the daily phase engine to the broker gateway, the strategy,
//! position management, persistence and notification sinks:
//! - Phase 0: session init and account check
//! - Phase 1: prior-close baseline
//! - Phase 2: pre-market change-rate filter
//! - Phase 3: candidate scoring and selection
//! - Phase 4: market buys, then exit monitoring
//! - Phase 5: liquidation and daily report

pub mod app;
pub mod config;
pub mod day;
pub mod engine;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use day::{AbortReason, DayStatus, PhaseFlags, TradingDay};
pub use engine::{EngineDeps, PhaseEngine};
pub use error::{AppError, AppResult};
