//! Per-day statistics output.
//!
//! Counters are process-lifetime; the reporter snapshots them at the start
//! of each trading day and reports the delta at session close.

use crate::metrics::{BROKER_CALLS_TOTAL, EXITS_TOTAL, ORDERS_TOTAL, PHASE_RUNS_TOTAL};
use chrono::{DateTime, FixedOffset, NaiveDate};
use daybreak_core::PhaseId;
use prometheus::core::Collector;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Execution outcomes of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseTally {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Statistics for one trading day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub phases: BTreeMap<String, PhaseTally>,
    pub buys_accepted: u64,
    pub buys_rejected: u64,
    pub sells_accepted: u64,
    pub sells_rejected: u64,
    pub exits: BTreeMap<String, u64>,
    pub broker_ok: u64,
    pub broker_errors: u64,
    pub broker_timeouts: u64,
    pub broker_suppressed: u64,
}

impl SessionStats {
    fn minus(&self, base: &SessionStats) -> SessionStats {
        let phases = self
            .phases
            .iter()
            .map(|(k, v)| {
                let b = base.phases.get(k).copied().unwrap_or_default();
                (
                    k.clone(),
                    PhaseTally {
                        completed: v.completed.saturating_sub(b.completed),
                        failed: v.failed.saturating_sub(b.failed),
                        skipped: v.skipped.saturating_sub(b.skipped),
                    },
                )
            })
            .collect();
        let exits = self
            .exits
            .iter()
            .map(|(k, v)| (k.clone(), v.saturating_sub(base.exits.get(k).copied().unwrap_or(0))))
            .collect();
        SessionStats {
            phases,
            buys_accepted: self.buys_accepted.saturating_sub(base.buys_accepted),
            buys_rejected: self.buys_rejected.saturating_sub(base.buys_rejected),
            sells_accepted: self.sells_accepted.saturating_sub(base.sells_accepted),
            sells_rejected: self.sells_rejected.saturating_sub(base.sells_rejected),
            exits,
            broker_ok: self.broker_ok.saturating_sub(base.broker_ok),
            broker_errors: self.broker_errors.saturating_sub(base.broker_errors),
            broker_timeouts: self.broker_timeouts.saturating_sub(base.broker_timeouts),
            broker_suppressed: self.broker_suppressed.saturating_sub(base.broker_suppressed),
        }
    }
}

/// Daily statistics reporter.
pub struct DailyStatsReporter {
    baseline: SessionStats,
    started_at: Option<DateTime<FixedOffset>>,
}

impl Default for DailyStatsReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl DailyStatsReporter {
    pub fn new() -> Self {
        Self {
            baseline: Self::snapshot(),
            started_at: None,
        }
    }

    /// Start a new reporting period (called at Daily Reset).
    pub fn begin_day(&mut self, at: DateTime<FixedOffset>) {
        self.baseline = Self::snapshot();
        self.started_at = Some(at);
    }

    /// Statistics accumulated since the last `begin_day`.
    pub fn get_stats(&self) -> SessionStats {
        Self::snapshot().minus(&self.baseline)
    }

    fn snapshot() -> SessionStats {
        let mut phases = BTreeMap::new();
        for phase in PhaseId::ALL {
            let name = phase.to_string();
            let tally = PhaseTally {
                completed: counter_value(&PHASE_RUNS_TOTAL, &[&name, "completed"]),
                failed: counter_value(&PHASE_RUNS_TOTAL, &[&name, "failed"]),
                skipped: counter_value(&PHASE_RUNS_TOTAL, &[&name, "skipped"]),
            };
            phases.insert(name, tally);
        }

        let mut exits = BTreeMap::new();
        for reason in ["TakeProfit", "StopLoss", "EndOfDay"] {
            exits.insert(reason.to_string(), counter_value(&EXITS_TOTAL, &[reason]));
        }

        SessionStats {
            phases,
            buys_accepted: counter_value(&ORDERS_TOTAL, &["buy", "accepted"]),
            buys_rejected: counter_value(&ORDERS_TOTAL, &["buy", "rejected"]),
            sells_accepted: counter_value(&ORDERS_TOTAL, &["sell", "accepted"]),
            sells_rejected: counter_value(&ORDERS_TOTAL, &["sell", "rejected"]),
            exits,
            broker_ok: sum_by_outcome(&BROKER_CALLS_TOTAL, "ok"),
            broker_errors: sum_by_outcome(&BROKER_CALLS_TOTAL, "error"),
            broker_timeouts: sum_by_outcome(&BROKER_CALLS_TOTAL, "timeout"),
            broker_suppressed: sum_by_outcome(&BROKER_CALLS_TOTAL, "suppressed"),
        }
    }

    /// Output the day's statistics to logs.
    pub fn output_daily_summary(&self, date: NaiveDate) {
        let stats = self.get_stats();

        info!("========== Daily Session Summary ==========");
        match self.started_at {
            Some(start) => info!("Date: {} (tracking since {})", date, start.format("%H:%M:%S")),
            None => info!("Date: {}", date),
        }
        for (phase, tally) in &stats.phases {
            if tally.completed + tally.failed + tally.skipped == 0 {
                continue;
            }
            info!(
                "  {:<20} completed={} failed={} skipped={}",
                phase, tally.completed, tally.failed, tally.skipped
            );
        }
        info!(
            "  Orders: buy {}/{} accepted, sell {}/{} accepted",
            stats.buys_accepted,
            stats.buys_accepted + stats.buys_rejected,
            stats.sells_accepted,
            stats.sells_accepted + stats.sells_rejected
        );
        info!(
            "  Exits: take-profit={} stop-loss={} end-of-day={}",
            stats.exits.get("TakeProfit").copied().unwrap_or(0),
            stats.exits.get("StopLoss").copied().unwrap_or(0),
            stats.exits.get("EndOfDay").copied().unwrap_or(0)
        );
        info!(
            "  Broker calls: ok={} error={} timeout={} suppressed={}",
            stats.broker_ok, stats.broker_errors, stats.broker_timeouts, stats.broker_suppressed
        );
        info!("===========================================");
    }
}

fn counter_value(counter: &prometheus::CounterVec, labels: &[&str]) -> u64 {
    counter.with_label_values(labels).get() as u64
}

/// Sum a counter over every label set whose `outcome` label matches.
fn sum_by_outcome(counter: &prometheus::CounterVec, outcome: &str) -> u64 {
    let mut total = 0.0;
    for mf in counter.collect() {
        for m in mf.get_metric() {
            let matches = m
                .get_label()
                .iter()
                .any(|pair| pair.get_name() == "outcome" && pair.get_value() == outcome);
            if matches {
                total += m.get_counter().get_value();
            }
        }
    }
    total as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;

    #[test]
    fn test_reports_delta_since_begin_day() {
        let mut reporter = DailyStatsReporter::new();
        Metrics::position_closed("StopLoss");
        let kst = FixedOffset::east_opt(9 * 3600).unwrap();
        reporter.begin_day(chrono::Utc::now().with_timezone(&kst));

        Metrics::position_closed("TakeProfit");
        Metrics::position_closed("TakeProfit");

        let stats = reporter.get_stats();
        // Metrics are global; other tests may add exits concurrently.
        assert!(stats.exits["TakeProfit"] >= 2);
    }

    #[test]
    fn test_phase_tallies_present_for_every_phase() {
        let reporter = DailyStatsReporter::new();
        let stats = reporter.get_stats();
        assert_eq!(stats.phases.len(), PhaseId::ALL.len());
    }
}
