//! Background position monitor.
//!
//! Polls every open position on its own interval, independent of the outer
//! scheduler tick, and sells on a profit-target or stop-loss hit. Runs as a
//! spawned task until cancelled through its [`MonitorHandle`], until the
//! management deadline passes, or until no position is left open.
//!
//! A poll in progress always runs to completion; cancellation is observed
//! only between polls. [`MonitorHandle::stop`] therefore returns only once
//! no further sell can be issued by the monitor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use daybreak_core::{Clock, ExitKind};
use daybreak_gateway::Session;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::book::PositionBook;
use crate::exit::ExitRule;
use crate::liquidation::close_position;
use crate::position::Position;

/// A position closed by the monitor.
#[derive(Debug, Clone)]
pub struct ExitEvent {
    pub position: Position,
    pub kind: ExitKind,
}

/// Counters reported when the monitor stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub polls: u64,
    pub exits: u32,
    pub sell_failures: u32,
    pub quote_failures: u32,
}

pub struct PositionMonitor {
    session: Session,
    book: PositionBook,
    rule: ExitRule,
    interval: Duration,
    clock: Arc<dyn Clock>,
    deadline: Option<DateTime<FixedOffset>>,
    events: Option<mpsc::UnboundedSender<ExitEvent>>,
}

impl PositionMonitor {
    pub fn new(
        session: Session,
        book: PositionBook,
        rule: ExitRule,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session,
            book,
            rule,
            interval,
            clock,
            deadline: None,
            events: None,
        }
    }

    /// Stop polling once the clock reaches `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<FixedOffset>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Publish every exit on `tx`.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ExitEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run on a new task.
    pub fn spawn(self) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(self.run(cancel.clone()));
        MonitorHandle { cancel, join }
    }

    pub async fn run(self, cancel: CancellationToken) -> MonitorSummary {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            open = self.book.open_positions().len(),
            "Position monitor started"
        );

        let mut summary = MonitorSummary::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Position monitor cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if let Some(deadline) = self.deadline {
                if self.clock.now() >= deadline {
                    info!(%deadline, "Management window over, position monitor stopping");
                    break;
                }
            }
            if self.book.open_positions().is_empty() {
                info!("No open positions left, position monitor stopping");
                break;
            }

            self.poll_once(&mut summary).await;
        }

        info!(
            polls = summary.polls,
            exits = summary.exits,
            sell_failures = summary.sell_failures,
            quote_failures = summary.quote_failures,
            "Position monitor stopped"
        );
        summary
    }

    /// One pass over every open position.
    pub async fn poll_once(&self, summary: &mut MonitorSummary) {
        summary.polls += 1;
        for position in self.book.open_positions() {
            let quote = match self.session.quote(&position.symbol).await {
                Ok(quote) => quote,
                Err(e) => {
                    summary.quote_failures += 1;
                    debug!(symbol = %position.symbol, error = %e, "No quote this poll");
                    continue;
                }
            };

            let Some(return_pct) = self.book.mark(&position.symbol, quote.price) else {
                continue;
            };
            trace!(symbol = %position.symbol, price = %quote.price, %return_pct, "Position marked");

            let Some(kind) = self.rule.evaluate(return_pct) else {
                continue;
            };
            let Some(ticket) = self.book.begin_exit(&position.symbol) else {
                continue;
            };

            info!(symbol = %position.symbol, %return_pct, reason = %kind, "Exit threshold reached");
            match close_position(&self.session, &self.book, ticket, kind, quote.price, self.clock.as_ref()).await {
                Ok(closed) => {
                    summary.exits += 1;
                    if let Some(tx) = &self.events {
                        if tx.send(ExitEvent { position: closed, kind }).is_err() {
                            warn!("Exit event receiver dropped");
                        }
                    }
                }
                Err(_) => summary.sell_failures += 1,
            }
        }
    }
}

/// Handle to a running monitor task.
pub struct MonitorHandle {
    cancel: CancellationToken,
    join: JoinHandle<MonitorSummary>,
}

impl MonitorHandle {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the task and wait for it to finish.
    pub async fn stop(self) -> MonitorSummary {
        self.cancel.cancel();
        match self.join.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Position monitor task failed");
                MonitorSummary::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::ExitConfig;
    use crate::position::PositionStatus;
    use chrono::TimeZone;
    use daybreak_core::{ManualClock, OrderSide, Price, Quantity, Symbol};
    use daybreak_gateway::mock::MockBroker;
    use daybreak_gateway::{BackoffPolicy, SessionConfig};

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 19, h, m, 0)
            .unwrap()
    }

    struct Fixture {
        broker: Arc<MockBroker>,
        session: Session,
        book: PositionBook,
        clock: Arc<ManualClock>,
    }

    async fn fixture(symbols: &[(&str, i64)]) -> Fixture {
        let broker = Arc::new(MockBroker::new());
        let config = SessionConfig {
            call_timeout: Duration::from_secs(2),
            backoff: BackoffPolicy::DISABLED,
        };
        let session = Session::open(broker.clone(), config, at(8, 29)).await.unwrap();
        let book = PositionBook::new();
        for (symbol, price) in symbols {
            let symbol = Symbol::new(symbol);
            broker.set_price(&symbol, Price::from_krw(*price));
            book.open(Position::new(
                symbol.clone(),
                symbol.as_str(),
                Quantity::new(10),
                Price::from_krw(*price),
                at(8, 59),
            ))
            .unwrap();
        }
        Fixture {
            broker,
            session,
            book,
            clock: Arc::new(ManualClock::new(at(9, 5))),
        }
    }

    fn monitor(f: &Fixture) -> PositionMonitor {
        PositionMonitor::new(
            f.session.clone(),
            f.book.clone(),
            ExitRule::new(&ExitConfig::default()),
            Duration::from_secs(5),
            f.clock.clone(),
        )
        .with_deadline(at(9, 59))
    }

    #[tokio::test(start_paused = true)]
    async fn test_profit_target_sells_once() {
        let f = fixture(&[("A", 10_000), ("B", 20_000)]).await;
        f.broker.set_price(&Symbol::new("A"), Price::from_krw(10_410));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = monitor(&f).with_events(tx).spawn();

        tokio::time::sleep(Duration::from_secs(12)).await;
        let summary = handle.stop().await;

        assert_eq!(summary.exits, 1);
        assert!(summary.polls >= 2);
        assert_eq!(f.broker.orders_for(&Symbol::new("A"), OrderSide::Sell).len(), 1);
        assert!(f.broker.orders_for(&Symbol::new("B"), OrderSide::Sell).is_empty());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ExitKind::TakeProfit);
        assert_eq!(event.position.status, PositionStatus::ClosedProfit);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_just_below_thresholds_holds() {
        let f = fixture(&[("A", 100_000), ("B", 100_000)]).await;
        f.broker.set_price(&Symbol::new("A"), Price::from_krw(103_996));
        f.broker.set_price(&Symbol::new("B"), Price::from_krw(98_005));
        let handle = monitor(&f).spawn();

        tokio::time::sleep(Duration::from_secs(12)).await;
        let summary = handle.stop().await;

        assert_eq!(summary.exits, 0);
        assert!(f.broker.get_orders().is_empty());
        let a = f.book.get(&Symbol::new("A")).unwrap();
        assert!(a.is_open());
        assert_eq!(a.return_pct, rust_decimal_macros::dec!(4.00));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sell_retried_next_poll() {
        let f = fixture(&[("A", 10_000), ("B", 20_000)]).await;
        let a = Symbol::new("A");
        f.broker.set_price(&a, Price::from_krw(9_750));
        f.broker.fail_orders(&a, OrderSide::Sell, 1);
        let handle = monitor(&f).spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(f.book.get(&a).unwrap().is_open());

        tokio::time::sleep(Duration::from_secs(5)).await;
        let summary = handle.stop().await;

        assert_eq!(summary.sell_failures, 1);
        assert_eq!(summary.exits, 1);
        assert_eq!(f.book.get(&a).unwrap().status, PositionStatus::ClosedLoss);
        assert_eq!(f.broker.orders_for(&a, OrderSide::Sell).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sells_after_stop() {
        let f = fixture(&[("A", 10_000)]).await;
        let handle = monitor(&f).spawn();
        tokio::time::sleep(Duration::from_secs(6)).await;
        handle.stop().await;

        f.broker.set_price(&Symbol::new("A"), Price::from_krw(11_000));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(f.broker.get_orders().is_empty());
        assert!(f.book.get(&Symbol::new("A")).unwrap().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_deadline() {
        let f = fixture(&[("A", 10_000)]).await;
        f.clock.set(at(9, 59));
        let handle = monitor(&f).spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.is_finished());
        assert_eq!(handle.stop().await.polls, 0);
    }
}
