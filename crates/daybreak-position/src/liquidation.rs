//! Selling positions: single exits and the end-of-day sweep.

use std::collections::HashMap;

use daybreak_core::{Clock, ExitKind, Holding, OrderRequest, OrderSide, Price, Quantity, Symbol};
use daybreak_gateway::Session;
use tracing::{debug, info, warn};

use crate::book::{ExitTicket, PositionBook};
use crate::error::PositionResult;
use crate::position::Position;

/// Market sell orders for every open, non-empty position.
///
/// Closed positions never appear in the plan.
#[must_use]
pub fn liquidation_plan(positions: &[Position]) -> Vec<OrderRequest> {
    positions
        .iter()
        .filter(|p| p.is_open() && !p.quantity.is_zero())
        .map(|p| OrderRequest::market(p.symbol.clone(), OrderSide::Sell, p.quantity))
        .collect()
}

/// Sell the ticket's full quantity at market and close the position.
///
/// A failed sell releases the ticket and leaves the position open, so the
/// next poll retries it.
pub async fn close_position(
    session: &Session,
    book: &PositionBook,
    ticket: ExitTicket,
    kind: ExitKind,
    exit_price: Price,
    clock: &dyn Clock,
) -> PositionResult<Position> {
    let request = OrderRequest::market(ticket.symbol().clone(), OrderSide::Sell, ticket.quantity());
    match session.place_order(&request).await {
        Ok(ack) => {
            let closed = book.complete_exit(
                ticket,
                kind.into(),
                exit_price,
                Some(ack.order_id),
                clock.now(),
            )?;
            info!(
                symbol = %closed.symbol,
                reason = %kind,
                quantity = closed.quantity.shares(),
                exit_price = %exit_price,
                return_pct = %closed.return_pct,
                "Position closed"
            );
            Ok(closed)
        }
        Err(e) => {
            warn!(symbol = %request.symbol, reason = %kind, error = %e, "Sell failed, position stays open");
            book.abort_exit(ticket);
            Err(e.into())
        }
    }
}

/// Outcome of the end-of-day sweep.
#[derive(Debug, Clone, Default)]
pub struct LiquidationSummary {
    pub closed: Vec<Position>,
    pub failed: Vec<Symbol>,
    /// Positions whose exit was already claimed elsewhere.
    pub skipped: Vec<Symbol>,
}

/// Force-sell every open position regardless of return.
///
/// Uses a fresh quote for the exit price when one is available, otherwise
/// the last observed price.
pub async fn liquidate_open(session: &Session, book: &PositionBook, clock: &dyn Clock) -> LiquidationSummary {
    let mut summary = LiquidationSummary::default();
    let plan = liquidation_plan(&book.open_positions());
    if plan.is_empty() {
        info!("No open positions to liquidate");
        return summary;
    }

    info!(count = plan.len(), "Liquidating open positions");
    for request in plan {
        let Some(ticket) = book.begin_exit(&request.symbol) else {
            summary.skipped.push(request.symbol);
            continue;
        };
        let exit_price = match session.quote(&request.symbol).await {
            Ok(quote) => quote.price,
            Err(e) => {
                warn!(symbol = %request.symbol, error = %e, "No quote for liquidation, using last price");
                ticket.last_price()
            }
        };
        match close_position(session, book, ticket, ExitKind::EndOfDay, exit_price, clock).await {
            Ok(closed) => summary.closed.push(closed),
            Err(_) => summary.failed.push(request.symbol),
        }
    }
    summary
}

/// An open position whose broker holding disagrees with the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingMismatch {
    pub symbol: Symbol,
    pub book: Quantity,
    /// Zero when the broker reports no holding at all.
    pub broker: Quantity,
}

/// Compare open positions against the broker's holdings.
///
/// Holdings the book never opened are logged and otherwise ignored; they
/// are not ours to sell.
#[must_use]
pub fn reconcile(positions: &[Position], holdings: &[Holding]) -> Vec<HoldingMismatch> {
    let mut held: HashMap<&Symbol, Quantity> = holdings.iter().map(|h| (&h.symbol, h.quantity)).collect();
    let mut mismatches = Vec::new();
    for position in positions.iter().filter(|p| p.is_open()) {
        let broker = held.remove(&position.symbol).unwrap_or(Quantity::ZERO);
        if broker != position.quantity {
            warn!(
                symbol = %position.symbol,
                book = position.quantity.shares(),
                broker = broker.shares(),
                "Holding does not match position book"
            );
            mismatches.push(HoldingMismatch {
                symbol: position.symbol.clone(),
                book: position.quantity,
                broker,
            });
        }
    }
    for (symbol, quantity) in held {
        debug!(symbol = %symbol, quantity = quantity.shares(), "Untracked holding left alone");
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionStatus;
    use chrono::{DateTime, FixedOffset, TimeZone};
    use daybreak_core::{ManualClock, Quantity};
    use daybreak_gateway::mock::MockBroker;
    use daybreak_gateway::SessionConfig;
    use std::sync::Arc;

    fn at() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 19, 9, 59, 0)
            .unwrap()
    }

    fn open(book: &PositionBook, symbol: &str, qty: u64, price: i64) {
        book.open(Position::new(
            Symbol::new(symbol),
            symbol,
            Quantity::new(qty),
            Price::from_krw(price),
            at(),
        ))
        .unwrap();
    }

    #[test]
    fn test_plan_excludes_closed_positions() {
        let book = PositionBook::new();
        open(&book, "A", 3, 10_000);
        open(&book, "B", 2, 20_000);
        let t = book.begin_exit(&Symbol::new("A")).unwrap();
        book.complete_exit(t, PositionStatus::ClosedProfit, Price::from_krw(10_500), None, at())
            .unwrap();

        let plan = liquidation_plan(&book.snapshot());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].symbol.as_str(), "B");
        assert_eq!(plan[0].side, OrderSide::Sell);
        assert_eq!(plan[0].quantity, Quantity::new(2));
    }

    fn holding(symbol: &str, qty: u64) -> Holding {
        Holding {
            symbol: Symbol::new(symbol),
            name: symbol.to_string(),
            quantity: Quantity::new(qty),
            avg_price: Price::from_krw(10_000),
            current_price: Price::from_krw(10_000),
            eval_amount: Default::default(),
            pnl: Default::default(),
            pnl_pct: Default::default(),
        }
    }

    #[test]
    fn test_reconcile_reports_open_positions_only() {
        let book = PositionBook::new();
        open(&book, "A", 3, 10_000);
        open(&book, "B", 2, 20_000);
        open(&book, "C", 4, 5_000);
        open(&book, "D", 1, 7_000);
        let t = book.begin_exit(&Symbol::new("D")).unwrap();
        book.complete_exit(t, PositionStatus::ClosedProfit, Price::from_krw(7_300), None, at())
            .unwrap();

        // A matches, B is short, C is missing, Z was never ours.
        let holdings = vec![holding("A", 3), holding("B", 1), holding("Z", 50)];
        let mismatches = reconcile(&book.snapshot(), &holdings);

        assert_eq!(
            mismatches,
            vec![
                HoldingMismatch {
                    symbol: Symbol::new("B"),
                    book: Quantity::new(2),
                    broker: Quantity::new(1),
                },
                HoldingMismatch {
                    symbol: Symbol::new("C"),
                    book: Quantity::new(4),
                    broker: Quantity::ZERO,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_liquidation_sells_each_open_position_once() {
        let broker = Arc::new(MockBroker::new());
        broker.set_price(&Symbol::new("A"), Price::from_krw(9_900));
        broker.set_price(&Symbol::new("B"), Price::from_krw(20_400));
        let session = Session::open(broker.clone(), SessionConfig::default(), at())
            .await
            .unwrap();
        let clock = ManualClock::new(at());

        let book = PositionBook::new();
        open(&book, "A", 3, 10_000);
        open(&book, "B", 2, 20_000);
        open(&book, "C", 1, 5_000);
        let t = book.begin_exit(&Symbol::new("C")).unwrap();
        book.complete_exit(t, PositionStatus::ClosedLoss, Price::from_krw(4_800), None, at())
            .unwrap();

        let summary = liquidate_open(&session, &book, &clock).await;

        assert_eq!(summary.closed.len(), 2);
        assert!(summary.failed.is_empty());
        assert_eq!(broker.orders_for(&Symbol::new("A"), OrderSide::Sell).len(), 1);
        assert_eq!(broker.orders_for(&Symbol::new("B"), OrderSide::Sell).len(), 1);
        assert!(broker.orders_for(&Symbol::new("C"), OrderSide::Sell).is_empty());
        assert_eq!(
            book.get(&Symbol::new("B")).unwrap().status,
            PositionStatus::ClosedEndOfDay
        );

        let again = liquidate_open(&session, &book, &clock).await;
        assert!(again.closed.is_empty());
        assert_eq!(broker.get_orders().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_liquidation_leaves_position_open() {
        let broker = Arc::new(MockBroker::new());
        let symbol = Symbol::new("A");
        broker.set_price(&symbol, Price::from_krw(10_000));
        broker.fail_orders(&symbol, OrderSide::Sell, 1);
        let session = Session::open(broker.clone(), SessionConfig::default(), at())
            .await
            .unwrap();
        let clock = ManualClock::new(at());
        let book = PositionBook::new();
        open(&book, "A", 3, 10_000);

        let summary = liquidate_open(&session, &book, &clock).await;
        assert_eq!(summary.failed, vec![symbol.clone()]);
        assert!(book.get(&symbol).unwrap().is_open());

        let retry = liquidate_open(&session, &book, &clock).await;
        assert_eq!(retry.closed.len(), 1);
    }
}
