//! End-of-day report.

use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::{AccountBalance, QuotaUsage};
use crate::market::Symbol;
use crate::order::OrderId;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    TakeProfit,
    StopLoss,
    EndOfDay,
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "TakeProfit"),
            Self::StopLoss => write!(f, "StopLoss"),
            Self::EndOfDay => write!(f, "EndOfDay"),
        }
    }
}

/// Aggregated trade counts for the day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeCounts {
    pub buys: u32,
    pub profit_exits: u32,
    pub loss_exits: u32,
    pub end_of_day_exits: u32,
}

impl TradeCounts {
    pub fn record_exit(&mut self, kind: ExitKind) {
        match kind {
            ExitKind::TakeProfit => self.profit_exits += 1,
            ExitKind::StopLoss => self.loss_exits += 1,
            ExitKind::EndOfDay => self.end_of_day_exits += 1,
        }
    }

    #[must_use]
    pub fn exits(&self) -> u32 {
        self.profit_exits + self.loss_exits + self.end_of_day_exits
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.buys + self.exits()
    }
}

/// Account state captured at session close.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub deposit: Decimal,
    pub total_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub pnl_pct: Decimal,
}

impl From<&AccountBalance> for AccountSnapshot {
    fn from(b: &AccountBalance) -> Self {
        Self {
            deposit: b.deposit,
            total_value: b.total_value,
            unrealized_pnl: b.unrealized_pnl,
            pnl_pct: b.pnl_pct,
        }
    }
}

/// Order history digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub buy_orders: u32,
    pub sell_orders: u32,
    /// Orders whose filled quantity was below the ordered quantity at close.
    pub unfilled: Vec<OrderId>,
}

/// End-of-day aggregate, written once at session close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub generated_at: DateTime<FixedOffset>,
    /// `None` when the balance query failed at close.
    pub account: Option<AccountSnapshot>,
    pub trades: TradeCounts,
    /// Realized P&L in KRW.
    pub realized_pnl: Decimal,
    /// Realized P&L over invested notional, in percent.
    pub return_pct: Option<Decimal>,
    pub orders: OrderSummary,
    pub quota: Option<QuotaUsage>,
    /// Positions the liquidation sweep could not sell.
    pub liquidation_failures: Vec<Symbol>,
}
