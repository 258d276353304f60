//! A single managed holding.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use daybreak_core::{round_pct, ExitKind, OrderId, Price, Quantity, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle of a position. Any `Closed*` status is terminal for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    ClosedProfit,
    ClosedLoss,
    ClosedEndOfDay,
}

impl PositionStatus {
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Exit kind for a closed status.
    #[must_use]
    pub fn exit_kind(&self) -> Option<ExitKind> {
        match self {
            Self::Open => None,
            Self::ClosedProfit => Some(ExitKind::TakeProfit),
            Self::ClosedLoss => Some(ExitKind::StopLoss),
            Self::ClosedEndOfDay => Some(ExitKind::EndOfDay),
        }
    }
}

impl From<ExitKind> for PositionStatus {
    fn from(kind: ExitKind) -> Self {
        match kind {
            ExitKind::TakeProfit => Self::ClosedProfit,
            ExitKind::StopLoss => Self::ClosedLoss,
            ExitKind::EndOfDay => Self::ClosedEndOfDay,
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::ClosedProfit => write!(f, "ClosedProfit"),
            Self::ClosedLoss => write!(f, "ClosedLoss"),
            Self::ClosedEndOfDay => write!(f, "ClosedEndOfDay"),
        }
    }
}

/// A long position opened by the day's buy execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub name: String,
    pub quantity: Quantity,
    pub entry_price: Price,
    pub last_price: Price,
    /// Return vs. entry in percent, rounded to 2 dp.
    pub return_pct: Decimal,
    pub status: PositionStatus,
    pub buy_order: Option<OrderId>,
    pub opened_at: DateTime<FixedOffset>,
    pub exit_price: Option<Price>,
    pub sell_order: Option<OrderId>,
    pub closed_at: Option<DateTime<FixedOffset>>,
}

impl Position {
    #[must_use]
    pub fn new(
        symbol: Symbol,
        name: impl Into<String>,
        quantity: Quantity,
        entry_price: Price,
        opened_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            symbol,
            name: name.into(),
            quantity,
            entry_price,
            last_price: entry_price,
            return_pct: Decimal::ZERO,
            status: PositionStatus::Open,
            buy_order: None,
            opened_at,
            exit_price: None,
            sell_order: None,
            closed_at: None,
        }
    }

    #[must_use]
    pub fn with_buy_order(mut self, order_id: OrderId) -> Self {
        self.buy_order = Some(order_id);
        self
    }

    /// Record an observed price.
    ///
    /// Returns the exact return percent for threshold checks; `return_pct`
    /// keeps the 2 dp copy for reporting.
    pub fn mark(&mut self, price: Price) -> Decimal {
        self.last_price = price;
        let exact = price.pct_from(self.entry_price).unwrap_or(Decimal::ZERO);
        self.return_pct = round_pct(exact);
        exact
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    #[must_use]
    pub fn buy_amount(&self) -> Decimal {
        self.quantity.notional(self.entry_price)
    }

    /// Sell proceeds, once closed.
    #[must_use]
    pub fn sell_amount(&self) -> Option<Decimal> {
        self.exit_price.map(|p| self.quantity.notional(p))
    }

    /// Realized profit in KRW, once closed.
    #[must_use]
    pub fn realized_pnl(&self) -> Option<Decimal> {
        self.sell_amount().map(|sell| sell - self.buy_amount())
    }
}
