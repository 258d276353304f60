//! Per-day state owned by the phase engine.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use daybreak_core::{BaselineSnapshot, PhaseId, ScoredCandidate, Symbol};
use daybreak_gateway::Session;
use daybreak_position::{HoldingMismatch, MonitorHandle, PositionBook};
use daybreak_strategy::FilterOutcome;

/// Completion flags of a trading day.
///
/// Flags only ever go from unset to set; the only way back is a fresh
/// [`TradingDay`] at Daily Reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseFlags {
    completed: BTreeSet<PhaseId>,
    monitoring_started: bool,
}

impl PhaseFlags {
    pub fn mark(&mut self, phase: PhaseId) {
        self.completed.insert(phase);
    }

    pub fn mark_monitoring_started(&mut self) {
        self.monitoring_started = true;
    }

    #[must_use]
    pub fn is_complete(&self, phase: PhaseId) -> bool {
        self.completed.contains(&phase)
    }

    #[must_use]
    pub fn monitoring_started(&self) -> bool {
        self.monitoring_started
    }

    /// Whether `phase` may run: its predecessor, if any, has completed.
    #[must_use]
    pub fn prerequisite_met(&self, phase: PhaseId) -> bool {
        phase
            .predecessor()
            .map_or(true, |prev| self.is_complete(prev))
    }

    #[must_use]
    pub fn completed(&self) -> Vec<PhaseId> {
        self.completed.iter().copied().collect()
    }

    /// True if every flag set in `earlier` is still set here.
    #[must_use]
    pub fn is_superset_of(&self, earlier: &PhaseFlags) -> bool {
        self.completed.is_superset(&earlier.completed)
            && (self.monitoring_started || !earlier.monitoring_started)
    }
}

/// Why a day stopped before Session Close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// First observed after the wake window without a session.
    LateStart,
    AuthFailed,
    /// No prior-close snapshot could be collected.
    NoBaseline,
}

impl AbortReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LateStart => "late_start",
            Self::AuthFailed => "auth_failed",
            Self::NoBaseline => "no_baseline",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LateStart => write!(f, "started after the wake window"),
            Self::AuthFailed => write!(f, "authentication failed"),
            Self::NoBaseline => write!(f, "no baseline snapshots"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStatus {
    Idle,
    /// Last phase whose action ran.
    Running(PhaseId),
    Completed,
    Aborted(AbortReason),
}

impl DayStatus {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

/// The unit of execution: everything the engine knows about one date.
pub struct TradingDay {
    pub date: NaiveDate,
    pub is_trading_day: bool,
    pub flags: PhaseFlags,
    pub status: DayStatus,
    /// When each phase action completed.
    pub transitions: BTreeMap<PhaseId, DateTime<FixedOffset>>,
    pub session: Option<Session>,
    pub baselines: BTreeMap<Symbol, BaselineSnapshot>,
    /// Latest Phase 2 pass; overwritten every tick.
    pub filter: Option<FilterOutcome>,
    pub monitoring_passes: u32,
    pub selection: Vec<ScoredCandidate>,
    pub book: PositionBook,
    pub monitor: Option<MonitorHandle>,
    /// Phases already reported as skipped today.
    pub warned: BTreeSet<PhaseId>,
    pub liquidation_failures: Vec<Symbol>,
    /// Open positions the broker's holdings disagreed with at close.
    pub holding_mismatches: Vec<HoldingMismatch>,
    pub reset_at: Option<DateTime<FixedOffset>>,
}

impl fmt::Debug for TradingDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradingDay")
            .field("date", &self.date)
            .field("is_trading_day", &self.is_trading_day)
            .field("status", &self.status)
            .field("flags", &self.flags)
            .field("baselines", &self.baselines.len())
            .field("selection", &self.selection.len())
            .field("positions", &self.book.len())
            .field("monitor_running", &self.monitor.is_some())
            .finish()
    }
}

impl TradingDay {
    pub fn new(date: NaiveDate, is_trading_day: bool) -> Self {
        Self {
            date,
            is_trading_day,
            flags: PhaseFlags::default(),
            status: DayStatus::Idle,
            transitions: BTreeMap::new(),
            session: None,
            baselines: BTreeMap::new(),
            filter: None,
            monitoring_passes: 0,
            selection: Vec::new(),
            book: PositionBook::new(),
            monitor: None,
            warned: BTreeSet::new(),
            liquidation_failures: Vec::new(),
            holding_mismatches: Vec::new(),
            reset_at: None,
        }
    }

    /// Record a completed phase.
    pub fn complete(&mut self, phase: PhaseId, at: DateTime<FixedOffset>) {
        self.flags.mark(phase);
        self.transitions.insert(phase, at);
    }

    pub fn abort(&mut self, reason: AbortReason) {
        self.status = DayStatus::Aborted(reason);
    }

    /// Phase 2 survivors of the last pass.
    #[must_use]
    pub fn filter_survivors(&self) -> &[daybreak_core::FilterResult] {
        self.filter.as_ref().map_or(&[], |f| f.passed.as_slice())
    }
}
