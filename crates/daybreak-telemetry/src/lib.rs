//! Prometheus metrics and structured logging for daybreak.
//!
//! - Prometheus metrics for phases, broker calls, orders and quota
//! - Structured logging with tracing (JSON in production)
//! - Per-day statistics summary emitted at session close

pub mod daily_stats;
pub mod error;
pub mod logging;
pub mod metrics;

pub use daily_stats::{DailyStatsReporter, PhaseTally, SessionStats};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LoggingConfig};
pub use metrics::Metrics;
