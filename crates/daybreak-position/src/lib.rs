//! Position management for the daybreak trading bot.
//!
//! # Key Components
//!
//! - [`Position`]: one holding bought at the open, closed exactly once
//! - [`PositionBook`]: shared, serialized position set with exit tickets
//! - [`ExitRule`]: profit-target / stop-loss evaluation
//! - [`PositionMonitor`]: background task polling open positions
//! - [`allocate`]: equal-cash, floor-division buy sizing
//! - [`liquidation_plan`], [`liquidate_open`]: end-of-day sweep
//! - [`reconcile`]: book vs. broker holdings check before the sweep

pub mod book;
pub mod error;
pub mod exit;
pub mod liquidation;
pub mod monitor;
pub mod position;
pub mod sizing;

pub use book::{ExitTicket, PositionBook};
pub use error::{PositionError, PositionResult};
pub use exit::{ExitConfig, ExitRule};
pub use liquidation::{
    close_position, liquidate_open, liquidation_plan, reconcile, HoldingMismatch, LiquidationSummary,
};
pub use monitor::{ExitEvent, MonitorHandle, MonitorSummary, PositionMonitor};
pub use position::{Position, PositionStatus};
pub use sizing::allocate;
