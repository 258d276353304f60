//! Account snapshots returned by the broker.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Price, Quantity};
use crate::market::Symbol;

/// Cash and valuation summary of the trading account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Cash available for new orders.
    pub available_cash: Decimal,
    /// Total deposit.
    pub deposit: Decimal,
    /// Total evaluated value (cash + holdings).
    pub total_value: Decimal,
    pub net_asset: Decimal,
    pub purchase_amount: Decimal,
    pub unrealized_pnl: Decimal,
    pub pnl_pct: Decimal,
}

/// One broker-side holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub name: String,
    pub quantity: Quantity,
    pub avg_price: Price,
    pub current_price: Price,
    pub eval_amount: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
}

/// API request quota consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub used: u64,
    pub limit: u64,
}

impl QuotaUsage {
    pub fn new(used: u64, limit: u64) -> Self {
        Self { used, limit }
    }

    /// Usage ratio in percent, `None` if the limit is unknown.
    #[must_use]
    pub fn usage_pct(&self) -> Option<f64> {
        if self.limit == 0 {
            return None;
        }
        Some(self.used as f64 / self.limit as f64 * 100.0)
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}
