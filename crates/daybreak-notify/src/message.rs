//! Notification payloads and their text rendering.

use chrono::NaiveDate;
use daybreak_core::{DailyReport, PhaseId, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

const OK: &str = "[OK]";
const WARN: &str = "[WARN]";
const FAIL: &str = "[FAIL]";
const INFO: &str = "[INFO]";

/// Kind of trade being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    TakeProfit,
    StopLoss,
    Liquidation,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::TakeProfit => write!(f, "TAKE PROFIT"),
            Self::StopLoss => write!(f, "STOP LOSS"),
            Self::Liquidation => write!(f, "LIQUIDATION"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeEvent {
    pub action: TradeAction,
    pub symbol: Symbol,
    pub name: String,
    pub quantity: u64,
    pub price: Decimal,
    /// Realized return, for sells.
    pub return_pct: Option<Decimal>,
    /// Set when the order was rejected.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    PhaseStarted {
        phase: PhaseId,
    },
    PhaseCompleted {
        phase: PhaseId,
        detail: String,
    },
    PhaseSkipped {
        phase: PhaseId,
        reason: String,
    },
    PhaseFailed {
        phase: PhaseId,
        error: String,
    },
    DayAborted {
        date: NaiveDate,
        reason: String,
    },
    Trade(TradeEvent),
    DailyReport(Box<DailyReport>),
    /// A scheduler tick failed; the loop cools down and resumes.
    SchedulerError {
        error: String,
        cooldown_secs: u64,
    },
    Shutdown {
        reason: String,
    },
}

impl Notification {
    /// True for messages that report a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        match self {
            Self::PhaseFailed { .. } | Self::DayAborted { .. } | Self::SchedulerError { .. } => {
                true
            }
            Self::Trade(t) => t.error.is_some(),
            _ => false,
        }
    }

    /// Single-message text with a leading status marker.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::PhaseStarted { phase } => format!("{INFO} {} ({phase}) started", phase.label()),
            Self::PhaseCompleted { phase, detail } if detail.is_empty() => {
                format!("{OK} {} ({phase}) completed", phase.label())
            }
            Self::PhaseCompleted { phase, detail } => {
                format!("{OK} {} ({phase}) completed: {detail}", phase.label())
            }
            Self::PhaseSkipped { phase, reason } => {
                format!("{WARN} {} ({phase}) skipped: {reason}", phase.label())
            }
            Self::PhaseFailed { phase, error } => {
                format!("{FAIL} {} ({phase}) failed: {error}", phase.label())
            }
            Self::DayAborted { date, reason } => {
                format!("{FAIL} Trading day {date} aborted: {reason}")
            }
            Self::Trade(trade) => render_trade(trade),
            Self::DailyReport(report) => render_report(report),
            Self::SchedulerError {
                error,
                cooldown_secs,
            } => format!("{FAIL} Scheduler error: {error} (resuming in {cooldown_secs}s)"),
            Self::Shutdown { reason } => format!("{WARN} Shutting down: {reason}"),
        }
    }
}

fn render_trade(t: &TradeEvent) -> String {
    let head = format!("{} {} ({}) x{} @ {}", t.action, t.name, t.symbol, t.quantity, t.price);
    if let Some(error) = &t.error {
        return format!("{FAIL} {head} rejected: {error}");
    }
    match t.return_pct {
        Some(pct) => format!("{OK} {head} return {pct:+}%"),
        None => format!("{OK} {head}"),
    }
}

fn render_report(r: &DailyReport) -> String {
    let mut lines = vec![format!("{INFO} Daily report {}", r.date)];
    lines.push(format!(
        "Trades: {} buys, {} take-profit, {} stop-loss, {} end-of-day",
        r.trades.buys, r.trades.profit_exits, r.trades.loss_exits, r.trades.end_of_day_exits
    ));
    match r.return_pct {
        Some(pct) => lines.push(format!("Realized P&L: {} KRW ({pct:+}%)", r.realized_pnl)),
        None => lines.push(format!("Realized P&L: {} KRW", r.realized_pnl)),
    }
    match &r.account {
        Some(account) => lines.push(format!(
            "Account: total {} KRW, unrealized {} KRW ({:+}%)",
            account.total_value, account.unrealized_pnl, account.pnl_pct
        )),
        None => lines.push(format!("{WARN} Account snapshot unavailable")),
    }
    if !r.orders.unfilled.is_empty() {
        lines.push(format!("{WARN} Unfilled orders: {}", r.orders.unfilled.len()));
    }
    if !r.liquidation_failures.is_empty() {
        let symbols: Vec<&str> = r.liquidation_failures.iter().map(Symbol::as_str).collect();
        lines.push(format!("{FAIL} Liquidation failed: {}", symbols.join(", ")));
    }
    if let Some(quota) = r.quota {
        lines.push(format!("API quota: {}/{}", quota.used, quota.limit));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(action: TradeAction, return_pct: Option<Decimal>, error: Option<&str>) -> TradeEvent {
        TradeEvent {
            action,
            symbol: Symbol::new("005930"),
            name: "Samsung".to_string(),
            quantity: 3,
            price: dec!(71000),
            return_pct,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_phase_messages_carry_status_markers() {
        let done = Notification::PhaseCompleted {
            phase: PhaseId::Baseline,
            detail: "98/100 snapshots".to_string(),
        };
        assert_eq!(done.render(), "[OK] Phase 1 (Baseline) completed: 98/100 snapshots");

        let failed = Notification::PhaseFailed {
            phase: PhaseId::SessionInit,
            error: "auth rejected".to_string(),
        };
        assert!(failed.render().starts_with("[FAIL] Phase 0"));
        assert!(failed.is_failure());

        let skipped = Notification::PhaseSkipped {
            phase: PhaseId::Selection,
            reason: "Monitoring not completed".to_string(),
        };
        assert!(skipped.render().starts_with("[WARN]"));
        assert!(!skipped.is_failure());
    }

    #[test]
    fn test_scheduler_error_is_failure() {
        let n = Notification::SchedulerError {
            error: "task panicked".to_string(),
            cooldown_secs: 60,
        };
        assert!(n.is_failure());
        assert_eq!(n.render(), "[FAIL] Scheduler error: task panicked (resuming in 60s)");
    }

    #[test]
    fn test_trade_rendering() {
        let sell = Notification::Trade(trade(TradeAction::TakeProfit, Some(dec!(4.12)), None));
        assert_eq!(
            sell.render(),
            "[OK] TAKE PROFIT Samsung (005930) x3 @ 71000 return +4.12%"
        );

        let rejected = Notification::Trade(trade(TradeAction::Buy, None, Some("insufficient cash")));
        assert!(rejected.render().starts_with("[FAIL] BUY"));
        assert!(rejected.is_failure());
    }
}
