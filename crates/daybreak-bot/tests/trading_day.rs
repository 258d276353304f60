//! Whole-day runs of the phase engine against the in-memory broker.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use daybreak_bot::config::{BrokerConfig, PersistenceConfig};
use daybreak_bot::{
    AbortReason, AppConfig, AppError, Application, DayStatus, EngineDeps, PhaseEngine, PhaseFlags,
};
use daybreak_core::{
    Clock, ExitKind, Holding, Instrument, ManualClock, OrderSide, PhaseId, Price, Quantity, Symbol,
};
use daybreak_gateway::mock::{MockBroker, MockMarketData};
use daybreak_notify::{Notification, RecordingNotifier, TradeAction};
use daybreak_persistence::{JournalKind, ReportWriter, TradeJournal};
use daybreak_position::PositionStatus;
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tokio_test::assert_ok;

fn kst(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(9 * 3600)
        .unwrap()
        .with_ymd_and_hms(2026, 10, day, hour, minute, 0)
        .unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
}

fn sym(code: &str) -> Symbol {
    Symbol::new(code)
}

fn config_for(dir: &Path, symbols: &[(&str, &str)]) -> AppConfig {
    AppConfig {
        universe: symbols
            .iter()
            .map(|(code, name)| Instrument {
                symbol: sym(code),
                name: (*name).to_string(),
            })
            .collect(),
        broker: BrokerConfig {
            backoff_base_secs: 0,
            ..Default::default()
        },
        persistence: PersistenceConfig {
            cache_dir: dir.join("cache"),
            report_dir: dir.join("reports"),
            journal_dir: dir.join("journal"),
            log_dir: None,
            retention_days: 30,
        },
        ..Default::default()
    }
}

struct Harness {
    broker: Arc<MockBroker>,
    market: Arc<MockMarketData>,
    notes: Arc<RecordingNotifier>,
    clock: Arc<ManualClock>,
    config: AppConfig,
    dir: TempDir,
}

impl Harness {
    fn new(symbols: &[(&str, &str)], start: DateTime<FixedOffset>) -> Self {
        let dir = TempDir::new().unwrap();
        let config = config_for(dir.path(), symbols);
        Self {
            broker: Arc::new(MockBroker::new()),
            market: Arc::new(MockMarketData::new()),
            notes: Arc::new(RecordingNotifier::new()),
            clock: Arc::new(ManualClock::new(start)),
            config,
            dir,
        }
    }

    fn deps(&self) -> EngineDeps {
        EngineDeps {
            broker: self.broker.clone(),
            market_data: self.market.clone(),
            notifier: self.notes.clone(),
            clock: self.clock.clone(),
        }
    }

    fn engine(&self) -> PhaseEngine {
        PhaseEngine::new(&self.config, self.deps()).unwrap()
    }

    /// Prior close for the Friday before 2026-10-19.
    fn close(&self, code: &str, close: i64) {
        self.market
            .set_close(&sym(code), date(16), Price::from_krw(close), 100_000);
    }

    fn price(&self, code: &str, price: i64) {
        self.broker.set_price(&sym(code), Price::from_krw(price));
    }

    async fn tick_at(&self, engine: &mut PhaseEngine, at: DateTime<FixedOffset>) -> Option<PhaseId> {
        self.clock.set(at);
        engine.tick().await.unwrap()
    }

    fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
        self.notes.count_matching(pred)
    }
}

fn holding(code: &str, shares: u64) -> Holding {
    Holding {
        symbol: sym(code),
        name: code.to_string(),
        quantity: Quantity::new(shares),
        avg_price: Price::from_krw(1),
        current_price: Price::from_krw(1),
        eval_amount: Default::default(),
        pnl: Default::default(),
        pnl_pct: Default::default(),
    }
}

/// Clock that panics on its next read once armed.
struct TrippedClock {
    inner: Arc<ManualClock>,
    armed: AtomicBool,
}

impl Clock for TrippedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("clock source went away");
        }
        self.inner.now()
    }
}

/// Runs phases 0 through 4 with A and C bought; the monitor is left running.
async fn managed_day(h: &Harness) -> PhaseEngine {
    h.close("A00001", 10_000);
    h.close("B00002", 20_000);
    h.close("C00003", 30_000);
    h.price("A00001", 10_300);
    h.price("B00002", 20_200);
    h.price("C00003", 30_750);
    h.broker.set_available_cash(dec!(1_000_000));
    let mut engine = h.engine();
    for minute in [29, 30, 35, 58, 59] {
        h.tick_at(&mut engine, kst(19, 8, minute)).await;
    }
    assert_eq!(
        h.tick_at(&mut engine, kst(19, 9, 0)).await,
        Some(PhaseId::PositionManagement)
    );
    assert!(engine.day().monitor.is_some());
    assert_eq!(engine.book().open_positions().len(), 2);
    engine
}

const ABC: [(&str, &str); 3] = [("A00001", "Alpha"), ("B00002", "Bravo"), ("C00003", "Charlie")];

#[tokio::test(start_paused = true)]
async fn test_full_day_take_profit_then_liquidation() {
    let h = Harness::new(&ABC, kst(19, 8, 27));
    h.close("A00001", 10_000);
    h.close("B00002", 20_000);
    h.close("C00003", 30_000);
    let mut engine = h.engine();

    let mut history: Vec<PhaseFlags> = vec![engine.flags().clone()];
    let mut step = |engine: &PhaseEngine| {
        let flags = engine.flags().clone();
        assert!(flags.is_superset_of(history.last().unwrap()));
        history.push(flags);
    };

    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 28)).await, Some(PhaseId::Reset));
    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 29)).await, Some(PhaseId::SessionInit));
    step(&engine);
    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 30)).await, Some(PhaseId::Baseline));
    assert_eq!(engine.day().baselines.len(), 3);
    step(&engine);

    // A +3.0%, B +1.0%, C +2.5%
    h.price("A00001", 10_300);
    h.price("B00002", 20_200);
    h.price("C00003", 30_750);
    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 35)).await, Some(PhaseId::Monitoring));
    let survivors: Vec<&str> = engine
        .day()
        .filter_survivors()
        .iter()
        .map(|r| r.symbol.as_str())
        .collect();
    assert_eq!(survivors, vec!["A00001", "C00003"]);
    step(&engine);

    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 58)).await, Some(PhaseId::Selection));
    assert_eq!(engine.day().selection.len(), 2);
    step(&engine);

    h.broker.set_available_cash(dec!(1_000_000));
    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 59)).await, Some(PhaseId::BuyExecution));
    assert_eq!(engine.book().get(&sym("A00001")).unwrap().quantity, Quantity::new(48));
    assert_eq!(engine.book().get(&sym("C00003")).unwrap().quantity, Quantity::new(16));
    assert!(engine.book().get(&sym("B00002")).is_none());
    step(&engine);

    assert_eq!(
        h.tick_at(&mut engine, kst(19, 9, 0)).await,
        Some(PhaseId::PositionManagement)
    );
    assert!(engine.day().monitor.is_some());
    step(&engine);

    // +4.50% on A crosses the profit target.
    h.price("A00001", 10_764);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.tick_at(&mut engine, kst(19, 9, 1)).await, None);
    let a = engine.book().get(&sym("A00001")).unwrap();
    assert_eq!(a.status, PositionStatus::ClosedProfit);
    assert!(engine.book().get(&sym("C00003")).unwrap().is_open());
    assert_eq!(
        h.count(|n| matches!(n, Notification::Trade(t) if t.action == TradeAction::TakeProfit)),
        1
    );

    // The broker reports fewer C shares than the book holds.
    h.broker.set_holdings(vec![holding("C00003", 10)]);
    assert_eq!(h.tick_at(&mut engine, kst(19, 9, 59)).await, Some(PhaseId::SessionClose));
    step(&engine);
    assert_eq!(engine.status(), DayStatus::Completed);
    let mismatches = &engine.day().holding_mismatches;
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].symbol, sym("C00003"));
    assert_eq!(mismatches[0].book, Quantity::new(16));
    assert_eq!(mismatches[0].broker, Quantity::new(10));
    assert!(engine.day().monitor.is_none());
    assert_eq!(
        engine.book().get(&sym("C00003")).unwrap().status,
        PositionStatus::ClosedEndOfDay
    );
    // A was already closed by the monitor; only C is swept.
    assert_eq!(h.broker.orders_for(&sym("A00001"), OrderSide::Sell).len(), 1);
    assert_eq!(h.broker.orders_for(&sym("C00003"), OrderSide::Sell).len(), 1);

    let report = ReportWriter::new(h.dir.path().join("reports"))
        .read_report(date(19))
        .unwrap();
    assert_eq!(report.trades.buys, 2);
    assert_eq!(report.trades.profit_exits, 1);
    assert_eq!(report.trades.end_of_day_exits, 1);
    assert_eq!(report.orders.buy_orders, 2);
    assert_eq!(report.orders.sell_orders, 2);
    assert!(report.orders.unfilled.is_empty());
    assert!(report.realized_pnl > dec!(0));
    assert!(report.return_pct.is_some());

    let trades = TradeJournal::new(h.dir.path().join("journal"))
        .read_day(date(19))
        .unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].kind, JournalKind::MonitorExit);
    assert_eq!(trades[0].reason, ExitKind::TakeProfit);
    assert_eq!(trades[1].kind, JournalKind::Liquidation);
    assert_eq!(trades[1].symbol, sym("C00003"));

    assert_eq!(h.count(|n| matches!(n, Notification::DailyReport(_))), 1);

    // Nothing runs again once the day is complete.
    assert_eq!(h.tick_at(&mut engine, kst(19, 9, 59)).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_equal_split_sizing() {
    let symbols = [("X00001", "X-ray"), ("Y00002", "Yankee"), ("Z00003", "Zulu")];
    let h = Harness::new(&symbols, kst(19, 8, 28));
    h.close("X00001", 97_000);
    h.close("Y00002", 48_800);
    h.close("Z00003", 29_200);
    let mut engine = h.engine();

    h.tick_at(&mut engine, kst(19, 8, 29)).await;
    h.tick_at(&mut engine, kst(19, 8, 30)).await;
    h.price("X00001", 100_000);
    h.price("Y00002", 50_000);
    h.price("Z00003", 30_000);
    h.tick_at(&mut engine, kst(19, 8, 35)).await;
    h.tick_at(&mut engine, kst(19, 8, 58)).await;
    assert_eq!(engine.day().selection.len(), 3);

    h.broker.set_available_cash(dec!(300_000));
    h.tick_at(&mut engine, kst(19, 8, 59)).await;

    let bought = |code: &str| {
        let orders = h.broker.orders_for(&sym(code), OrderSide::Buy);
        assert_eq!(orders.len(), 1);
        orders[0].quantity
    };
    assert_eq!(bought("X00001"), Quantity::new(1));
    assert_eq!(bought("Y00002"), Quantity::new(2));
    assert_eq!(bought("Z00003"), Quantity::new(3));
    assert_eq!(
        h.count(|n| matches!(n, Notification::Trade(t) if t.action == TradeAction::Buy && t.error.is_none())),
        3
    );

    // A second tick inside the buy window does not buy again.
    h.tick_at(&mut engine, kst(19, 8, 59)).await;
    assert_eq!(h.broker.orders_for(&sym("X00001"), OrderSide::Buy).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_starts_clean_day() {
    let h = Harness::new(&ABC, kst(19, 8, 28));
    h.close("A00001", 10_000);
    h.close("B00002", 20_000);
    h.close("C00003", 30_000);
    h.price("A00001", 10_300);
    h.price("B00002", 20_200);
    h.price("C00003", 30_750);
    let mut engine = h.engine();

    h.tick_at(&mut engine, kst(19, 8, 29)).await;
    h.tick_at(&mut engine, kst(19, 8, 30)).await;
    h.tick_at(&mut engine, kst(19, 8, 35)).await;
    assert!(engine.day().filter.is_some());
    let fetched = h.market.calls();
    assert_eq!(fetched, 3);

    // Next morning: new prior closes, stale cache.
    h.market.set_close(&sym("A00001"), date(19), Price::from_krw(11_000), 1);
    h.market.set_close(&sym("B00002"), date(19), Price::from_krw(21_000), 1);
    h.market.set_close(&sym("C00003"), date(19), Price::from_krw(31_000), 1);
    assert_eq!(h.tick_at(&mut engine, kst(20, 8, 28)).await, Some(PhaseId::Reset));

    let day = engine.day();
    assert_eq!(day.date, date(20));
    assert_eq!(day.status, DayStatus::Idle);
    assert!(day.flags.completed().is_empty());
    assert!(!day.flags.monitoring_started());
    assert!(day.baselines.is_empty());
    assert!(day.filter.is_none());
    assert!(day.session.is_none());

    h.tick_at(&mut engine, kst(20, 8, 29)).await;
    h.tick_at(&mut engine, kst(20, 8, 30)).await;
    assert_eq!(h.market.calls(), fetched + 3);
    assert_eq!(
        engine.day().baselines[&sym("A00001")].prior_close,
        Price::from_krw(11_000)
    );
}

#[tokio::test]
async fn test_late_start_aborts_without_trading() {
    let h = Harness::new(&ABC, kst(19, 9, 10));
    let mut engine = h.engine();

    assert_eq!(h.tick_at(&mut engine, kst(19, 9, 10)).await, None);
    assert_eq!(engine.status(), DayStatus::Aborted(AbortReason::LateStart));
    assert_eq!(h.broker.auth_calls(), 0);
    assert_eq!(h.count(|n| matches!(n, Notification::DayAborted { .. })), 1);

    assert_eq!(h.tick_at(&mut engine, kst(19, 9, 59)).await, None);
    assert!(h.broker.get_orders().is_empty());
    assert_eq!(h.count(|n| matches!(n, Notification::DayAborted { .. })), 1);
}

#[tokio::test]
async fn test_auth_failure_aborts_day() {
    let h = Harness::new(&ABC, kst(19, 8, 28));
    h.broker.set_auth_ok(false);
    let mut engine = h.engine();

    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 29)).await, Some(PhaseId::SessionInit));
    assert_eq!(engine.status(), DayStatus::Aborted(AbortReason::AuthFailed));
    assert!(!engine.flags().is_complete(PhaseId::SessionInit));
    assert_eq!(h.count(|n| matches!(n, Notification::PhaseFailed { .. })), 1);

    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 30)).await, None);
    assert_eq!(h.market.calls(), 0);
}

#[tokio::test]
async fn test_no_baseline_aborts_day() {
    let h = Harness::new(&ABC, kst(19, 8, 28));
    let mut engine = h.engine();

    h.tick_at(&mut engine, kst(19, 8, 29)).await;
    h.tick_at(&mut engine, kst(19, 8, 30)).await;
    assert_eq!(engine.status(), DayStatus::Aborted(AbortReason::NoBaseline));
    assert_eq!(h.market.calls(), 3);
    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 35)).await, None);
    assert_eq!(h.broker.quote_calls(), 0);
}

#[tokio::test]
async fn test_missed_window_skips_with_single_warning() {
    let h = Harness::new(&ABC, kst(19, 8, 28));
    h.close("A00001", 10_000);
    let mut engine = h.engine();

    h.tick_at(&mut engine, kst(19, 8, 29)).await;
    h.tick_at(&mut engine, kst(19, 8, 30)).await;

    // Monitoring never ran; the clock jumps straight to selection.
    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 58)).await, None);
    h.clock.set(kst(19, 8, 58) + chrono::Duration::seconds(30));
    assert_eq!(engine.tick().await.unwrap(), None);
    assert!(!engine.flags().is_complete(PhaseId::Selection));
    assert_eq!(h.count(|n| matches!(n, Notification::PhaseSkipped { .. })), 1);

    assert_eq!(h.tick_at(&mut engine, kst(19, 8, 59)).await, None);
    assert_eq!(h.count(|n| matches!(n, Notification::PhaseSkipped { .. })), 2);
    assert!(h.broker.get_orders().is_empty());
}

#[tokio::test]
async fn test_monitoring_keeps_latest_pass() {
    let h = Harness::new(&ABC, kst(19, 8, 28));
    h.close("A00001", 10_000);
    h.close("B00002", 20_000);
    h.close("C00003", 30_000);
    let mut engine = h.engine();
    h.tick_at(&mut engine, kst(19, 8, 29)).await;
    h.tick_at(&mut engine, kst(19, 8, 30)).await;

    h.price("A00001", 10_300);
    h.price("B00002", 20_200);
    h.price("C00003", 30_750);
    h.tick_at(&mut engine, kst(19, 8, 35)).await;
    assert_eq!(engine.day().filter_survivors().len(), 2);

    // B moves into the band, A leaves it.
    h.price("A00001", 10_500);
    h.price("B00002", 20_600);
    h.tick_at(&mut engine, kst(19, 8, 40)).await;
    let survivors: Vec<&str> = engine
        .day()
        .filter_survivors()
        .iter()
        .map(|r| r.symbol.as_str())
        .collect();
    assert_eq!(survivors, vec!["B00002", "C00003"]);
    assert_eq!(engine.day().monitoring_passes, 2);
    assert_eq!(
        h.count(|n| matches!(n, Notification::PhaseStarted { phase: PhaseId::Monitoring })),
        1
    );
}

#[tokio::test]
async fn test_baseline_cache_reused_after_restart() {
    let h = Harness::new(&ABC, kst(19, 8, 28));
    h.close("A00001", 10_000);
    h.close("B00002", 20_000);
    h.close("C00003", 30_000);

    let mut first = h.engine();
    h.tick_at(&mut first, kst(19, 8, 29)).await;
    h.tick_at(&mut first, kst(19, 8, 30)).await;
    assert_eq!(h.market.calls(), 3);
    drop(first);

    let mut second = h.engine();
    h.tick_at(&mut second, kst(19, 8, 29)).await;
    h.clock.set(kst(19, 8, 30) + chrono::Duration::seconds(30));
    assert_eq!(second.tick().await.unwrap(), Some(PhaseId::Baseline));
    assert_eq!(second.day().baselines.len(), 3);
    assert_eq!(h.market.calls(), 3);
}

#[tokio::test]
async fn test_no_cash_means_no_orders_and_empty_report() {
    let h = Harness::new(&ABC, kst(19, 8, 28));
    h.close("A00001", 10_000);
    h.price("A00001", 10_300);
    let mut engine = h.engine();

    for minute in [29, 30, 35, 58, 59] {
        h.tick_at(&mut engine, kst(19, 8, minute)).await;
    }
    assert!(engine.flags().is_complete(PhaseId::BuyExecution));
    assert!(h.broker.get_orders().is_empty());

    assert_eq!(
        h.tick_at(&mut engine, kst(19, 9, 0)).await,
        Some(PhaseId::PositionManagement)
    );
    assert!(engine.day().monitor.is_none());

    assert_eq!(h.tick_at(&mut engine, kst(19, 9, 59)).await, Some(PhaseId::SessionClose));
    let report = ReportWriter::new(h.dir.path().join("reports"))
        .read_report(date(19))
        .unwrap();
    assert_eq!(report.trades.buys, 0);
    assert_eq!(report.realized_pnl, dec!(0));
    assert!(report.return_pct.is_none());
}

#[tokio::test]
async fn test_weekend_is_idle() {
    let h = Harness::new(&ABC, kst(18, 8, 28));
    let mut engine = h.engine();
    assert_eq!(h.tick_at(&mut engine, kst(18, 8, 29)).await, None);
    assert_eq!(engine.status(), DayStatus::Idle);
    assert_eq!(h.broker.auth_calls(), 0);
}

#[tokio::test]
async fn test_application_single_tick() {
    let h = Harness::new(&ABC, kst(19, 8, 29));
    let app = Application::new(&h.config, h.deps()).unwrap();
    let ran = assert_ok!(app.run_once().await);
    assert_eq!(ran, Some(PhaseId::SessionInit));
    assert_eq!(h.broker.auth_calls(), 1);
    let engine = app.engine();
    assert!(engine.lock().await.flags().is_complete(PhaseId::SessionInit));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_liquidates_open_positions() {
    let h = Harness::new(&ABC, kst(19, 8, 28));
    let mut engine = managed_day(&h).await;

    h.clock.set(kst(19, 9, 20));
    let summary = engine.shutdown(true, "interrupt").await.unwrap();

    assert_eq!(summary.closed.len(), 2);
    assert!(summary.failed.is_empty());
    assert!(engine.day().monitor.is_none());
    for code in ["A00001", "C00003"] {
        assert_eq!(h.broker.orders_for(&sym(code), OrderSide::Sell).len(), 1);
        assert_eq!(
            engine.book().get(&sym(code)).unwrap().status,
            PositionStatus::ClosedEndOfDay
        );
    }
    assert_eq!(
        h.count(|n| matches!(n, Notification::Shutdown { reason } if reason == "interrupt")),
        1
    );

    let trades = TradeJournal::new(h.dir.path().join("journal"))
        .read_day(date(19))
        .unwrap();
    assert_eq!(trades.len(), 2);
    assert!(trades.iter().all(|t| t.kind == JournalKind::Liquidation));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_without_liquidation_sends_no_orders() {
    let h = Harness::new(&ABC, kst(19, 8, 28));
    let mut engine = managed_day(&h).await;
    let placed = h.broker.get_orders().len();

    h.clock.set(kst(19, 9, 20));
    assert!(engine.shutdown(false, "terminate").await.is_none());

    assert!(engine.day().monitor.is_none());
    assert_eq!(h.broker.get_orders().len(), placed);
    assert!(h.broker.orders_for(&sym("A00001"), OrderSide::Sell).is_empty());
    assert_eq!(engine.book().open_positions().len(), 2);
    assert_eq!(h.count(|n| matches!(n, Notification::Shutdown { .. })), 1);

    // The stopped monitor sells nothing afterwards.
    h.price("A00001", 11_000);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.broker.orders_for(&sym("A00001"), OrderSide::Sell).is_empty());
}

#[tokio::test]
async fn test_application_recovers_from_panicking_tick() {
    let h = Harness::new(&ABC, kst(19, 8, 29));
    let clock = Arc::new(TrippedClock {
        inner: h.clock.clone(),
        armed: AtomicBool::new(false),
    });
    let deps = EngineDeps {
        clock: clock.clone(),
        ..h.deps()
    };
    let app = Application::new(&h.config, deps).unwrap();

    clock.armed.store(true, Ordering::SeqCst);
    let err = app.run_once().await.unwrap_err();
    assert!(matches!(err, AppError::Task(ref e) if e.is_panic()));
    assert_eq!(h.broker.auth_calls(), 0);

    let ran = assert_ok!(app.run_once().await);
    assert_eq!(ran, Some(PhaseId::SessionInit));
    assert_eq!(h.broker.auth_calls(), 1);
}
