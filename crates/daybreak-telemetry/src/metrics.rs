//! Prometheus metrics for the daybreak bot.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. Registration only
//! fails on duplicate metric names, a fatal programming error that should
//! crash at first use. These panics only occur during static
//! initialization, never afterwards.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_counter,
    register_int_gauge, CounterVec, Encoder, Gauge, HistogramVec, IntCounter, IntGauge,
    TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Phase executions.
/// Labels: phase, outcome (completed/failed/skipped)
pub static PHASE_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "daybreak_phase_runs_total",
        "Phase executions by outcome",
        &["phase", "outcome"]
    )
    .unwrap()
});

/// Phase execution wall time in seconds.
pub static PHASE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "daybreak_phase_duration_seconds",
        "Phase execution duration in seconds",
        &["phase"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .unwrap()
});

/// Scheduler loop ticks.
pub static SCHEDULER_TICKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("daybreak_scheduler_ticks_total", "Scheduler loop ticks").unwrap()
});

/// Ticks that ended in an error and triggered the cooldown.
pub static SCHEDULER_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "daybreak_scheduler_errors_total",
        "Scheduler ticks that failed and entered cooldown"
    )
    .unwrap()
});

/// Days that failed closed.
/// Labels: reason
pub static DAY_ABORTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "daybreak_day_aborts_total",
        "Trading days aborted before completion",
        &["reason"]
    )
    .unwrap()
});

/// Broker gateway calls.
/// Labels: operation, outcome (ok/error/timeout/suppressed)
pub static BROKER_CALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "daybreak_broker_calls_total",
        "Broker gateway calls by outcome",
        &["operation", "outcome"]
    )
    .unwrap()
});

/// Broker call latency in milliseconds.
pub static BROKER_CALL_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "daybreak_broker_call_latency_ms",
        "Broker gateway call latency in milliseconds",
        &["operation"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Orders submitted.
/// Labels: side, outcome (accepted/rejected)
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "daybreak_orders_total",
        "Orders submitted by side and outcome",
        &["side", "outcome"]
    )
    .unwrap()
});

/// Closed positions.
/// Labels: reason (TakeProfit/StopLoss/EndOfDay)
pub static EXITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "daybreak_exits_total",
        "Closed positions by exit reason",
        &["reason"]
    )
    .unwrap()
});

/// Currently open positions.
pub static OPEN_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("daybreak_open_positions", "Positions with status Open").unwrap()
});

/// Size of the latest band-filter pass set.
pub static FILTER_PASS_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "daybreak_filter_pass_count",
        "Instruments in the latest band-filter pass set"
    )
    .unwrap()
});

/// Baseline snapshots loaded for the day.
pub static BASELINE_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "daybreak_baseline_count",
        "Baseline snapshots available for the current day"
    )
    .unwrap()
});

/// API quota used.
pub static QUOTA_USED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("daybreak_quota_used", "Broker API requests used").unwrap()
});

/// API quota limit.
pub static QUOTA_LIMIT: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("daybreak_quota_limit", "Broker API request limit").unwrap()
});

/// Notification deliveries that failed.
pub static NOTIFY_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "daybreak_notify_failures_total",
        "Notification deliveries that failed"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn phase_completed(phase: &str, elapsed_secs: f64) {
        PHASE_RUNS_TOTAL
            .with_label_values(&[phase, "completed"])
            .inc();
        PHASE_DURATION_SECONDS
            .with_label_values(&[phase])
            .observe(elapsed_secs);
    }

    pub fn phase_failed(phase: &str) {
        PHASE_RUNS_TOTAL.with_label_values(&[phase, "failed"]).inc();
    }

    pub fn phase_skipped(phase: &str) {
        PHASE_RUNS_TOTAL.with_label_values(&[phase, "skipped"]).inc();
    }

    pub fn scheduler_tick() {
        SCHEDULER_TICKS_TOTAL.inc();
    }

    pub fn scheduler_error() {
        SCHEDULER_ERRORS_TOTAL.inc();
    }

    pub fn day_aborted(reason: &str) {
        DAY_ABORTS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn broker_call(operation: &str, outcome: &str, latency_ms: f64) {
        BROKER_CALLS_TOTAL
            .with_label_values(&[operation, outcome])
            .inc();
        BROKER_CALL_LATENCY_MS
            .with_label_values(&[operation])
            .observe(latency_ms);
    }

    pub fn broker_call_suppressed(operation: &str) {
        BROKER_CALLS_TOTAL
            .with_label_values(&[operation, "suppressed"])
            .inc();
    }

    pub fn order_accepted(side: &str) {
        ORDERS_TOTAL.with_label_values(&[side, "accepted"]).inc();
    }

    pub fn order_rejected(side: &str) {
        ORDERS_TOTAL.with_label_values(&[side, "rejected"]).inc();
    }

    pub fn position_closed(reason: &str) {
        EXITS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn open_positions_set(count: usize) {
        OPEN_POSITIONS.set(count as i64);
    }

    pub fn filter_pass_set(count: usize) {
        FILTER_PASS_COUNT.set(count as i64);
    }

    pub fn baseline_count_set(count: usize) {
        BASELINE_COUNT.set(count as i64);
    }

    pub fn quota(used: u64, limit: u64) {
        QUOTA_USED.set(used as f64);
        QUOTA_LIMIT.set(limit as f64);
    }

    pub fn notify_failed() {
        NOTIFY_FAILURES_TOTAL.inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
