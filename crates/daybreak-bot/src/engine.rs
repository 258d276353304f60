//! Phase engine.
//!
//! Owns the [`TradingDay`] and advances it one scheduler tick at a time.
//! Each tick maps the clock to a phase window and runs that phase's action
//! if its predecessor has completed. Every phase except Monitoring runs at
//! most once per day; Monitoring re-filters on every tick of its window.
//!
//! Broker failures never leave a phase method: they are logged, counted,
//! and either degrade the phase or abort the day.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};
use daybreak_core::{
    round_pct, AccountSnapshot, BaselineSnapshot, Clock, DailyReport, ExitKind, Instrument,
    OrderRequest, OrderSide, OrderSummary, PhaseId, Timetable,
};
use daybreak_gateway::{with_timeout, DynBroker, DynMarketData, Session, SessionConfig};
use daybreak_notify::{Notification, SharedNotifier, TradeAction, TradeEvent};
use daybreak_persistence::{
    prune_older_than, BaselineCache, JournalKind, ReportWriter, SelectionRecord, TradeJournal,
    TradeRecord,
};
use daybreak_position::{
    allocate, liquidate_open, reconcile, ExitEvent, ExitRule, LiquidationSummary, Position,
    PositionBook,
};
use daybreak_strategy::{BandFilter, CandidateScorer};
use daybreak_telemetry::{DailyStatsReporter, Metrics};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::day::{AbortReason, DayStatus, PhaseFlags, TradingDay};
use crate::error::AppResult;

/// External collaborators of the engine.
#[derive(Clone)]
pub struct EngineDeps {
    pub broker: DynBroker,
    pub market_data: DynMarketData,
    pub notifier: SharedNotifier,
    pub clock: Arc<dyn Clock>,
}

pub struct PhaseEngine {
    timetable: Timetable,
    universe: Vec<Instrument>,
    filter: BandFilter,
    scorer: CandidateScorer,
    exit_rule: ExitRule,
    session_config: SessionConfig,
    monitor_interval: Duration,
    quota_warn_pct: f64,
    deps: EngineDeps,
    cache: BaselineCache,
    reports: ReportWriter,
    journal: TradeJournal,
    prunable: Vec<PathBuf>,
    retention_days: u32,
    stats: DailyStatsReporter,
    day: TradingDay,
    exits_rx: Option<mpsc::UnboundedReceiver<ExitEvent>>,
}

impl PhaseEngine {
    pub fn new(config: &AppConfig, deps: EngineDeps) -> AppResult<Self> {
        let timetable = config.timetable.build()?;
        let today = deps.clock.now().date_naive();
        let day = TradingDay::new(today, timetable.is_trading_day(today));

        info!(
            universe = config.universe.len(),
            %today,
            trading_day = day.is_trading_day,
            "Phase engine ready"
        );

        Ok(Self {
            universe: config.universe.clone(),
            filter: BandFilter::new(&config.filter),
            scorer: CandidateScorer::new(&config.filter, &config.scoring),
            exit_rule: ExitRule::new(&config.exits),
            session_config: config.broker.session_config(),
            monitor_interval: config.timetable.monitor_interval(),
            quota_warn_pct: config.broker.quota_warn_pct,
            cache: BaselineCache::in_dir(&config.persistence.cache_dir),
            reports: ReportWriter::new(&config.persistence.report_dir),
            journal: TradeJournal::new(&config.persistence.journal_dir),
            prunable: config.persistence.prunable_dirs(),
            retention_days: config.persistence.retention_days,
            stats: DailyStatsReporter::new(),
            timetable,
            deps,
            day,
            exits_rx: None,
        })
    }

    #[must_use]
    pub fn day(&self) -> &TradingDay {
        &self.day
    }

    #[must_use]
    pub fn flags(&self) -> &PhaseFlags {
        &self.day.flags
    }

    #[must_use]
    pub fn status(&self) -> DayStatus {
        self.day.status
    }

    #[must_use]
    pub fn book(&self) -> &PositionBook {
        &self.day.book
    }

    #[must_use]
    pub fn timetable(&self) -> &Timetable {
        &self.timetable
    }

    /// Evaluate the clock once and run whatever the current window calls for.
    ///
    /// Returns the phase whose action ran, if any.
    pub async fn tick(&mut self) -> AppResult<Option<PhaseId>> {
        let now = self.deps.clock.now();
        Metrics::scheduler_tick();

        let mut reset = false;
        if now.date_naive() != self.day.date {
            self.reset(now).await;
            reset = true;
        }
        self.drain_exit_events(now);

        let Some(phase) = self.timetable.current_phase(now) else {
            return Ok(None);
        };

        if phase == PhaseId::Reset {
            if self.day.reset_at.is_none() {
                self.reset(now).await;
                reset = true;
            }
            return Ok(reset.then_some(PhaseId::Reset));
        }

        if matches!(self.day.status, DayStatus::Aborted(_) | DayStatus::Completed) {
            return Ok(None);
        }

        if phase > PhaseId::SessionInit
            && !self.day.flags.is_complete(PhaseId::SessionInit)
            && self.day.status == DayStatus::Idle
        {
            self.abort(AbortReason::LateStart);
            return Ok(None);
        }

        if !self.day.flags.prerequisite_met(phase) {
            self.warn_skip(phase);
            return Ok(None);
        }
        if phase != PhaseId::Monitoring && self.day.flags.is_complete(phase) {
            return Ok(None);
        }

        self.day.status = DayStatus::Running(phase);
        let started = Instant::now();
        match phase {
            PhaseId::Reset => {}
            PhaseId::SessionInit => self.run_session_init(now).await,
            PhaseId::Baseline => self.run_baseline(now).await,
            PhaseId::Monitoring => self.run_monitoring(now).await,
            PhaseId::Selection => self.run_selection(now),
            PhaseId::BuyExecution => self.run_buy(now).await,
            PhaseId::PositionManagement => self.run_management(now),
            PhaseId::SessionClose => self.run_session_close(now).await?,
        }
        debug!(
            phase = %phase,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Phase action finished"
        );

        self.check_quota().await;
        Ok(Some(phase))
    }

    /// Daily Reset: stop anything still running and start a clean day.
    pub async fn reset(&mut self, now: DateTime<FixedOffset>) {
        if let Some(handle) = self.day.monitor.take() {
            let summary = handle.stop().await;
            info!(polls = summary.polls, exits = summary.exits, "Stopped leftover position monitor");
        }
        self.drain_exit_events(now);
        self.exits_rx = None;

        let open = self.day.book.open_positions().len();
        if open > 0 {
            warn!(open, date = %self.day.date, "Discarding day with open positions");
        }
        self.journal.close();

        let today = now.date_naive();
        let previous = self.day.date;
        self.day = TradingDay::new(today, self.timetable.is_trading_day(today));
        self.day.reset_at = Some(now);
        self.stats.begin_day(now);

        Metrics::open_positions_set(0);
        Metrics::filter_pass_set(0);
        Metrics::baseline_count_set(0);

        info!(
            %previous,
            %today,
            trading_day = self.day.is_trading_day,
            "Daily reset"
        );
    }

    /// Stop the monitor and optionally sell what is still open.
    pub async fn shutdown(&mut self, liquidate: bool, reason: &str) -> Option<LiquidationSummary> {
        let now = self.deps.clock.now();
        if let Some(handle) = self.day.monitor.take() {
            let summary = handle.stop().await;
            info!(polls = summary.polls, exits = summary.exits, "Position monitor stopped for shutdown");
        }
        self.drain_exit_events(now);
        self.exits_rx = None;

        let mut result = None;
        let open = self.day.book.open_positions().len();
        if open > 0 {
            match self.day.session.clone() {
                Some(session) if liquidate => {
                    warn!(open, "Liquidating open positions on interrupt");
                    let summary = liquidate_open(&session, &self.day.book, self.deps.clock.as_ref()).await;
                    for position in &summary.closed {
                        self.record_exit(position, JournalKind::Liquidation, ExitKind::EndOfDay, now);
                    }
                    result = Some(summary);
                }
                _ => warn!(open, "Exiting with open positions"),
            }
        }
        self.journal.close();
        self.notify(Notification::Shutdown {
            reason: reason.to_string(),
        });
        result
    }

    // ---- Phase 0 ----------------------------------------------------------

    async fn run_session_init(&mut self, now: DateTime<FixedOffset>) {
        let phase = PhaseId::SessionInit;
        let started = Instant::now();
        self.notify(Notification::PhaseStarted { phase });

        let session = match Session::open(self.deps.broker.clone(), self.session_config, now).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Authentication failed");
                self.fail(phase, e.to_string());
                self.abort(AbortReason::AuthFailed);
                return;
            }
        };

        let detail = match session.balance().await {
            Ok(balance) => {
                info!(
                    available_cash = %balance.available_cash,
                    total_value = %balance.total_value,
                    "Account reachable"
                );
                format!("available cash {} KRW", balance.available_cash)
            }
            Err(e) => {
                warn!(error = %e, "Account check failed, continuing");
                "account check unavailable".to_string()
            }
        };
        self.day.session = Some(session);
        self.prune_expired(now);
        self.finish(phase, now, started, detail);
    }

    fn prune_expired(&self, now: DateTime<FixedOffset>) {
        for dir in &self.prunable {
            if let Err(e) = prune_older_than(dir, self.retention_days, now.date_naive()) {
                warn!(dir = %dir.display(), error = %e, "Retention pruning failed");
            }
        }
    }

    // ---- Phase 1 ----------------------------------------------------------

    async fn run_baseline(&mut self, now: DateTime<FixedOffset>) {
        let phase = PhaseId::Baseline;
        let started = Instant::now();
        let today = now.date_naive();
        self.notify(Notification::PhaseStarted { phase });

        if let Some(cached) = self.cache.load(today) {
            let count = cached.len();
            self.day.baselines = cached.into_iter().map(|s| (s.symbol.clone(), s)).collect();
            Metrics::baseline_count_set(count);
            self.finish(phase, now, started, format!("{count} snapshots from cache"));
            return;
        }

        let Some(prior) = self.timetable.calendar().prior_trading_day(today) else {
            self.fail(phase, "no prior trading day".to_string());
            self.abort(AbortReason::NoBaseline);
            return;
        };

        let timeout = self.session_config.call_timeout;
        let mut failures = 0usize;
        for instrument in &self.universe {
            let fetched = with_timeout(
                "prior_close",
                timeout,
                self.deps.market_data.get_prior_close(&instrument.symbol, prior),
            )
            .await;
            match fetched {
                Ok(bar) => {
                    let snapshot = BaselineSnapshot::from_bar(instrument, bar, now);
                    self.day.baselines.insert(snapshot.symbol.clone(), snapshot);
                }
                Err(e) => {
                    failures += 1;
                    debug!(symbol = %instrument.symbol, error = %e, "Prior close unavailable");
                }
            }
        }

        let count = self.day.baselines.len();
        Metrics::baseline_count_set(count);
        if count == 0 {
            error!(universe = self.universe.len(), "No baseline snapshot collected");
            self.fail(phase, format!("0/{} prior closes", self.universe.len()));
            self.abort(AbortReason::NoBaseline);
            return;
        }
        if failures > 0 {
            warn!(failures, collected = count, "Some prior closes unavailable");
        }

        let snapshots: Vec<BaselineSnapshot> = self.day.baselines.values().cloned().collect();
        if let Err(e) = self.cache.save(today, now, &snapshots) {
            warn!(error = %e, "Failed to save baseline cache");
        }
        self.finish(
            phase,
            now,
            started,
            format!("{count}/{} snapshots (prior session {prior})", self.universe.len()),
        );
    }

    // ---- Phase 2 ----------------------------------------------------------

    async fn run_monitoring(&mut self, now: DateTime<FixedOffset>) {
        let phase = PhaseId::Monitoring;
        let Some(session) = self.day.session.clone() else {
            return;
        };
        let started = Instant::now();
        if !self.day.flags.monitoring_started() {
            self.day.flags.mark_monitoring_started();
            self.notify(Notification::PhaseStarted { phase });
        }

        let mut quotes = Vec::with_capacity(self.day.baselines.len());
        let mut failures = 0usize;
        for symbol in self.day.baselines.keys() {
            match session.quote(symbol).await {
                Ok(quote) => quotes.push(quote),
                Err(_) => failures += 1,
            }
        }

        let baselines = &self.day.baselines;
        let outcome = self.filter.evaluate(
            quotes
                .iter()
                .filter_map(|q| baselines.get(&q.symbol).map(|b| (b, q))),
        );
        self.day.monitoring_passes += 1;
        Metrics::filter_pass_set(outcome.passed.len());
        info!(
            pass = self.day.monitoring_passes,
            evaluated = outcome.evaluated.len(),
            qualified = outcome.qualified(),
            kept = outcome.passed.len(),
            quote_failures = failures,
            "Filter pass"
        );
        self.day.filter = Some(outcome);

        if !self.day.flags.is_complete(phase) {
            self.day.complete(phase, now);
        }
        Metrics::phase_completed(&phase.to_string(), started.elapsed().as_secs_f64());
    }

    // ---- Phase 3 ----------------------------------------------------------

    fn run_selection(&mut self, now: DateTime<FixedOffset>) {
        let phase = PhaseId::Selection;
        let started = Instant::now();
        let survivors = self.day.filter_survivors().to_vec();
        let selected = self.scorer.select(&survivors);

        let record = SelectionRecord {
            date: now.date_naive(),
            generated_at: now,
            evaluated: survivors.len(),
            selected: selected.clone(),
        };
        if let Err(e) = self.reports.write_selection(&record) {
            warn!(error = %e, "Failed to write selection record");
        }

        let detail = if selected.is_empty() {
            format!("no candidates after {} filter passes", self.day.monitoring_passes)
        } else {
            selected
                .iter()
                .map(|c| format!("{} ({:.2})", c.symbol(), c.score))
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.day.selection = selected;
        self.finish(phase, now, started, detail);
    }

    // ---- Phase 4 ----------------------------------------------------------

    async fn run_buy(&mut self, now: DateTime<FixedOffset>) {
        let phase = PhaseId::BuyExecution;
        let Some(session) = self.day.session.clone() else {
            return;
        };
        let started = Instant::now();
        // Claimed up front: one attempt per day even if the batch is interrupted.
        self.day.complete(phase, now);

        let selection = self.day.selection.clone();
        if selection.is_empty() {
            info!("No selected candidates, no buy orders");
            Metrics::phase_completed(&phase.to_string(), started.elapsed().as_secs_f64());
            self.notify_completed(phase, "no candidates, nothing bought".to_string());
            return;
        }

        let cash = match session.balance().await {
            Ok(balance) => balance.available_cash,
            Err(e) => {
                warn!(error = %e, "Balance unavailable, treating cash as zero");
                Decimal::ZERO
            }
        };
        if cash <= Decimal::ZERO {
            info!(%cash, "No available cash, no buy orders");
            Metrics::phase_completed(&phase.to_string(), started.elapsed().as_secs_f64());
            self.notify_completed(phase, "no available cash".to_string());
            return;
        }

        let mut prices = Vec::with_capacity(selection.len());
        for candidate in &selection {
            let price = match session.quote(candidate.symbol()).await {
                Ok(quote) if quote.price.is_positive() => quote.price,
                Ok(_) | Err(_) => {
                    warn!(symbol = %candidate.symbol(), "No fresh quote, sizing on last filter price");
                    candidate.candidate.current_price
                }
            };
            prices.push(price);
        }
        let quantities = allocate(cash, &prices);

        let mut bought = 0usize;
        for ((candidate, price), quantity) in selection.iter().zip(prices).zip(quantities) {
            let symbol = candidate.symbol().clone();
            let name = candidate.candidate.name.clone();
            if quantity.is_zero() {
                info!(symbol = %symbol, %price, "Budget below one share, skipped");
                continue;
            }
            let request = OrderRequest::market(symbol.clone(), OrderSide::Buy, quantity);
            match session.place_order(&request).await {
                Ok(ack) => {
                    let position = Position::new(symbol.clone(), name.clone(), quantity, price, now)
                        .with_buy_order(ack.order_id.clone());
                    if let Err(e) = self.day.book.open(position) {
                        error!(symbol = %symbol, error = %e, "Bought but could not record position");
                        continue;
                    }
                    bought += 1;
                    info!(symbol = %symbol, quantity = quantity.shares(), %price, order_id = %ack.order_id, "Bought");
                    self.notify(Notification::Trade(TradeEvent {
                        action: TradeAction::Buy,
                        symbol,
                        name,
                        quantity: quantity.shares(),
                        price: price.inner(),
                        return_pct: None,
                        error: None,
                    }));
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Buy order failed");
                    self.notify(Notification::Trade(TradeEvent {
                        action: TradeAction::Buy,
                        symbol,
                        name,
                        quantity: quantity.shares(),
                        price: price.inner(),
                        return_pct: None,
                        error: Some(e.to_string()),
                    }));
                }
            }
        }

        Metrics::phase_completed(&phase.to_string(), started.elapsed().as_secs_f64());
        self.notify_completed(
            phase,
            format!("{bought}/{} bought with {cash} KRW", selection.len()),
        );
    }

    fn run_management(&mut self, now: DateTime<FixedOffset>) {
        let phase = PhaseId::PositionManagement;
        let Some(session) = self.day.session.clone() else {
            return;
        };
        let started = Instant::now();
        let open = self.day.book.open_positions().len();
        if open == 0 {
            self.finish(phase, now, started, "no open positions".to_string());
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = daybreak_position::PositionMonitor::new(
            session,
            self.day.book.clone(),
            self.exit_rule,
            self.monitor_interval,
            self.deps.clock.clone(),
        )
        .with_deadline(self.timetable.management_deadline(now))
        .with_events(tx)
        .spawn();
        self.day.monitor = Some(handle);
        self.exits_rx = Some(rx);
        self.finish(phase, now, started, format!("monitoring {open} positions"));
    }

    /// Journal and announce exits published by the monitor.
    fn drain_exit_events(&mut self, now: DateTime<FixedOffset>) {
        let Some(rx) = self.exits_rx.as_mut() else {
            return;
        };
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        for event in events {
            self.record_exit(&event.position, JournalKind::MonitorExit, event.kind, now);
        }
    }

    fn record_exit(
        &mut self,
        position: &Position,
        journal_kind: JournalKind,
        reason: ExitKind,
        now: DateTime<FixedOffset>,
    ) {
        let sell_price = position.exit_price.unwrap_or(position.last_price);
        let record = TradeRecord {
            recorded_at: position.closed_at.unwrap_or(now),
            symbol: position.symbol.clone(),
            name: position.name.clone(),
            kind: journal_kind,
            reason,
            quantity: position.quantity.shares(),
            buy_price: position.entry_price.inner(),
            sell_price: sell_price.inner(),
            buy_amount: position.buy_amount(),
            sell_amount: position.sell_amount().unwrap_or_default(),
            return_pct: position.return_pct,
            profit: position.realized_pnl().unwrap_or_default(),
        };
        if let Err(e) = self.journal.append(&record) {
            warn!(symbol = %position.symbol, error = %e, "Failed to journal trade");
        }
        let action = match reason {
            ExitKind::TakeProfit => TradeAction::TakeProfit,
            ExitKind::StopLoss => TradeAction::StopLoss,
            ExitKind::EndOfDay => TradeAction::Liquidation,
        };
        self.notify(Notification::Trade(TradeEvent {
            action,
            symbol: position.symbol.clone(),
            name: position.name.clone(),
            quantity: position.quantity.shares(),
            price: sell_price.inner(),
            return_pct: Some(position.return_pct),
            error: None,
        }));
    }

    // ---- Phase 5 ----------------------------------------------------------

    async fn run_session_close(&mut self, now: DateTime<FixedOffset>) -> AppResult<()> {
        let phase = PhaseId::SessionClose;
        let started = Instant::now();
        self.notify(Notification::PhaseStarted { phase });

        // The monitor must be gone before the sweep touches any position.
        if let Some(handle) = self.day.monitor.take() {
            let summary = handle.stop().await;
            info!(
                polls = summary.polls,
                exits = summary.exits,
                sell_failures = summary.sell_failures,
                "Position monitor stopped for session close"
            );
        }
        self.drain_exit_events(now);
        self.exits_rx = None;

        let Some(session) = self.day.session.clone() else {
            return Ok(());
        };
        let today = now.date_naive();

        let mut orders = OrderSummary::default();
        match session.list_orders(today, today).await {
            Ok(records) => {
                for record in &records {
                    match record.side {
                        OrderSide::Buy => orders.buy_orders += 1,
                        OrderSide::Sell => orders.sell_orders += 1,
                    }
                    if record.is_unfilled() {
                        warn!(
                            order_id = %record.order_id,
                            symbol = %record.symbol,
                            remaining = record.remaining().shares(),
                            "Unfilled order at close"
                        );
                        orders.unfilled.push(record.order_id.clone());
                    }
                }
            }
            Err(e) => warn!(error = %e, "Order history unavailable"),
        }

        match session.positions().await {
            Ok(holdings) => {
                self.day.holding_mismatches = reconcile(&self.day.book.open_positions(), &holdings);
            }
            Err(e) => warn!(error = %e, "Holdings unavailable, sweeping from the book"),
        }

        let sweep = liquidate_open(&session, &self.day.book, self.deps.clock.as_ref()).await;
        orders.sell_orders += sweep.closed.len() as u32;
        for position in &sweep.closed {
            self.record_exit(position, JournalKind::Liquidation, ExitKind::EndOfDay, now);
        }
        for symbol in &sweep.failed {
            let Some(position) = self.day.book.get(symbol) else {
                continue;
            };
            self.notify(Notification::Trade(TradeEvent {
                action: TradeAction::Liquidation,
                symbol: symbol.clone(),
                name: position.name,
                quantity: position.quantity.shares(),
                price: position.last_price.inner(),
                return_pct: Some(position.return_pct),
                error: Some("sell order rejected".to_string()),
            }));
        }
        self.day.liquidation_failures = sweep.failed;

        let account = match session.balance().await {
            Ok(balance) => Some(AccountSnapshot::from(&balance)),
            Err(e) => {
                warn!(error = %e, "Balance unavailable for report");
                None
            }
        };
        let quota = session.quota_usage().await.ok();

        let book = &self.day.book;
        let realized_pnl = book.realized_pnl();
        let invested = book.invested();
        let return_pct = (invested > Decimal::ZERO)
            .then(|| round_pct(realized_pnl / invested * Decimal::ONE_HUNDRED));
        let report = DailyReport {
            date: today,
            generated_at: now,
            account,
            trades: book.trade_counts(),
            realized_pnl,
            return_pct,
            orders,
            quota,
            liquidation_failures: self.day.liquidation_failures.clone(),
        };
        let written = self.reports.write_report(&report);
        if let Err(e) = &written {
            error!(error = %e, "Failed to write daily report");
        }
        let detail = format!(
            "{} exits, realized {} KRW",
            report.trades.exits(),
            report.realized_pnl
        );
        self.notify(Notification::DailyReport(Box::new(report)));
        self.stats.output_daily_summary(today);
        self.journal.close();

        self.finish(phase, now, started, detail);
        self.day.status = DayStatus::Completed;
        written?;
        Ok(())
    }

    // ---- helpers ----------------------------------------------------------

    fn notify(&self, notification: Notification) {
        self.deps.notifier.notify(notification);
    }

    fn notify_completed(&self, phase: PhaseId, detail: String) {
        info!(phase = %phase, %detail, "Phase completed");
        self.notify(Notification::PhaseCompleted { phase, detail });
    }

    fn finish(&mut self, phase: PhaseId, now: DateTime<FixedOffset>, started: Instant, detail: String) {
        self.day.complete(phase, now);
        Metrics::phase_completed(&phase.to_string(), started.elapsed().as_secs_f64());
        self.notify_completed(phase, detail);
    }

    fn fail(&self, phase: PhaseId, error: String) {
        Metrics::phase_failed(&phase.to_string());
        self.notify(Notification::PhaseFailed { phase, error });
    }

    fn abort(&mut self, reason: AbortReason) {
        error!(date = %self.day.date, reason = %reason, "Trading day aborted");
        Metrics::day_aborted(reason.as_str());
        self.notify(Notification::DayAborted {
            date: self.day.date,
            reason: reason.to_string(),
        });
        self.day.abort(reason);
    }

    fn warn_skip(&mut self, phase: PhaseId) {
        if !self.day.warned.insert(phase) {
            return;
        }
        let missing = phase
            .predecessor()
            .map_or_else(String::new, |p| p.to_string());
        warn!(phase = %phase, missing = %missing, "Prerequisite phase not completed, skipping");
        Metrics::phase_skipped(&phase.to_string());
        self.notify(Notification::PhaseSkipped {
            phase,
            reason: format!("{missing} not completed"),
        });
    }

    /// Read-only quota check; failures are ignored.
    async fn check_quota(&self) {
        let Some(session) = &self.day.session else {
            return;
        };
        match session.quota_usage().await {
            Ok(quota) => {
                Metrics::quota(quota.used, quota.limit);
                match quota.usage_pct() {
                    Some(pct) if pct >= self.quota_warn_pct => {
                        warn!(used = quota.used, limit = quota.limit, pct, "API quota pressure");
                    }
                    _ => debug!(used = quota.used, limit = quota.limit, "API quota"),
                }
            }
            Err(e) => debug!(error = %e, "Quota check failed"),
        }
    }
}
