//! Shared position set.
//!
//! The book is the single writer for every position: the monitor task and
//! the session-close sweep both go through it. Selling requires an
//! [`ExitTicket`], and at most one ticket can be outstanding per position,
//! so two callers can never sell the same holding. A position transitions
//! to a closed status exactly once, through [`PositionBook::complete_exit`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use daybreak_core::{OrderId, Price, Quantity, Symbol, TradeCounts};
use daybreak_telemetry::Metrics;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{PositionError, PositionResult};
use crate::position::{Position, PositionStatus};

#[derive(Debug, Default)]
struct BookState {
    positions: BTreeMap<Symbol, Position>,
    exiting: BTreeSet<Symbol>,
}

impl BookState {
    fn open_count(&self) -> usize {
        self.positions.values().filter(|p| p.is_open()).count()
    }
}

/// Cloneable handle to the day's positions.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    inner: Arc<Mutex<BookState>>,
}

/// Exclusive right to sell one open position.
///
/// Dropping an unresolved ticket releases the claim, leaving the position
/// open.
#[derive(Debug)]
pub struct ExitTicket {
    book: PositionBook,
    symbol: Symbol,
    quantity: Quantity,
    last_price: Price,
    resolved: bool,
}

impl ExitTicket {
    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[must_use]
    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Last observed price when the ticket was issued.
    #[must_use]
    pub fn last_price(&self) -> Price {
        self.last_price
    }
}

impl Drop for ExitTicket {
    fn drop(&mut self) {
        if !self.resolved {
            self.book.inner.lock().exiting.remove(&self.symbol);
        }
    }
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly bought position. One position per symbol per day.
    pub fn open(&self, position: Position) -> PositionResult<()> {
        let mut state = self.inner.lock();
        if state.positions.contains_key(&position.symbol) {
            return Err(PositionError::Duplicate(position.symbol.to_string()));
        }
        info!(
            symbol = %position.symbol,
            quantity = position.quantity.shares(),
            entry_price = %position.entry_price,
            "Position opened"
        );
        state.positions.insert(position.symbol.clone(), position);
        Metrics::open_positions_set(state.open_count());
        Ok(())
    }

    /// Update an open position with an observed price.
    ///
    /// Returns the unrounded return percent, or `None` if the position is closed
    /// or unknown (closed positions are no longer marked).
    pub fn mark(&self, symbol: &Symbol, price: Price) -> Option<Decimal> {
        let mut state = self.inner.lock();
        let position = state.positions.get_mut(symbol).filter(|p| p.is_open())?;
        Some(position.mark(price))
    }

    /// Claim the exit of an open position.
    ///
    /// `None` if the position is closed, unknown, or another exit is already
    /// in flight.
    pub fn begin_exit(&self, symbol: &Symbol) -> Option<ExitTicket> {
        let mut state = self.inner.lock();
        let (quantity, last_price) = {
            let position = state.positions.get(symbol).filter(|p| p.is_open())?;
            (position.quantity, position.last_price)
        };
        if !state.exiting.insert(symbol.clone()) {
            debug!(symbol = %symbol, "Exit already in flight");
            return None;
        }
        Some(ExitTicket {
            book: self.clone(),
            symbol: symbol.clone(),
            quantity,
            last_price,
            resolved: false,
        })
    }

    /// Close the ticket's position. Returns the closed position.
    pub fn complete_exit(
        &self,
        mut ticket: ExitTicket,
        status: PositionStatus,
        exit_price: Price,
        sell_order: Option<OrderId>,
        at: DateTime<FixedOffset>,
    ) -> PositionResult<Position> {
        if status.is_open() {
            return Err(PositionError::InvalidState(
                "complete_exit requires a closed status".to_string(),
            ));
        }
        let mut state = self.inner.lock();
        state.exiting.remove(&ticket.symbol);
        ticket.resolved = true;

        let position = state
            .positions
            .get_mut(&ticket.symbol)
            .ok_or_else(|| PositionError::NotFound(ticket.symbol.to_string()))?;
        if position.status.is_closed() {
            return Err(PositionError::InvalidState(format!(
                "{} already {}",
                ticket.symbol, position.status
            )));
        }
        position.mark(exit_price);
        position.status = status;
        position.exit_price = Some(exit_price);
        position.sell_order = sell_order;
        position.closed_at = Some(at);
        let closed = position.clone();

        if let Some(kind) = status.exit_kind() {
            Metrics::position_closed(&kind.to_string());
        }
        Metrics::open_positions_set(state.open_count());
        Ok(closed)
    }

    /// Release a ticket after a failed sell; the position stays open.
    pub fn abort_exit(&self, ticket: ExitTicket) {
        debug!(symbol = %ticket.symbol, "Exit aborted, position remains open");
        drop(ticket);
    }

    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<Position> {
        self.inner.lock().positions.get(symbol).cloned()
    }

    /// Open positions in symbol order.
    #[must_use]
    pub fn open_positions(&self) -> Vec<Position> {
        self.inner
            .lock()
            .positions
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect()
    }

    /// All positions, open and closed, in symbol order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Position> {
        self.inner.lock().positions.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().positions.is_empty()
    }

    #[must_use]
    pub fn trade_counts(&self) -> TradeCounts {
        let state = self.inner.lock();
        let mut counts = TradeCounts {
            buys: state.positions.len() as u32,
            ..Default::default()
        };
        for kind in state.positions.values().filter_map(|p| p.status.exit_kind()) {
            counts.record_exit(kind);
        }
        counts
    }

    /// Realized profit over closed positions, from observed exit prices.
    #[must_use]
    pub fn realized_pnl(&self) -> Decimal {
        self.inner
            .lock()
            .positions
            .values()
            .filter_map(Position::realized_pnl)
            .sum()
    }

    /// Notional bought today.
    #[must_use]
    pub fn invested(&self) -> Decimal {
        self.inner
            .lock()
            .positions
            .values()
            .map(Position::buy_amount)
            .sum()
    }
}
