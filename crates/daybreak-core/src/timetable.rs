//! Daily phase timetable.
//!
//! Maps exchange-local wall-clock time to the active phase. Each phase owns
//! the half-open window `[start, next phase start)`, the last one ending at
//! the sleep boundary, so windows are contiguous and never overlap. Because
//! every boundary is at least a minute apart, a scheduler ticking every 30
//! seconds lands inside each window at least once even after a missed tick.

use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::calendar::TradingCalendar;
use crate::error::{CoreError, Result};

/// Time-gated stage of a trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhaseId {
    /// Daily Reset of per-day state.
    Reset,
    /// Phase 0: authentication and account sanity check.
    SessionInit,
    /// Phase 1: prior-close baseline collection.
    Baseline,
    /// Phase 2: pre-market quote polling and band filter.
    Monitoring,
    /// Phase 3: composite scoring and selection.
    Selection,
    /// Phase 4a: single-shot buy execution.
    BuyExecution,
    /// Phase 4b: threshold-triggered position monitoring.
    PositionManagement,
    /// Phase 5: stale order review, liquidation and reporting.
    SessionClose,
}

impl PhaseId {
    pub const ALL: [PhaseId; 8] = [
        PhaseId::Reset,
        PhaseId::SessionInit,
        PhaseId::Baseline,
        PhaseId::Monitoring,
        PhaseId::Selection,
        PhaseId::BuyExecution,
        PhaseId::PositionManagement,
        PhaseId::SessionClose,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Phase that must have completed before this one may run.
    #[must_use]
    pub fn predecessor(self) -> Option<PhaseId> {
        match self {
            Self::Reset | Self::SessionInit => None,
            Self::Baseline => Some(Self::SessionInit),
            Self::Monitoring => Some(Self::Baseline),
            Self::Selection => Some(Self::Monitoring),
            Self::BuyExecution => Some(Self::Selection),
            Self::PositionManagement => Some(Self::BuyExecution),
            Self::SessionClose => Some(Self::PositionManagement),
        }
    }

    /// Numbering used in operator-facing messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Reset => "Reset",
            Self::SessionInit => "Phase 0",
            Self::Baseline => "Phase 1",
            Self::Monitoring => "Phase 2",
            Self::Selection => "Phase 3",
            Self::BuyExecution | Self::PositionManagement => "Phase 4",
            Self::SessionClose => "Phase 5",
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => write!(f, "Reset"),
            Self::SessionInit => write!(f, "SessionInit"),
            Self::Baseline => write!(f, "Baseline"),
            Self::Monitoring => write!(f, "Monitoring"),
            Self::Selection => write!(f, "Selection"),
            Self::BuyExecution => write!(f, "BuyExecution"),
            Self::PositionManagement => write!(f, "PositionManagement"),
            Self::SessionClose => write!(f, "SessionClose"),
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone)]
pub struct Timetable {
    /// Start of each phase window, indexed by `PhaseId as usize`.
    starts: [NaiveTime; 8],
    /// End of the last window; nothing runs from here until the next reset.
    sleep: NaiveTime,
    calendar: TradingCalendar,
}

impl Default for Timetable {
    /// KRX pre-market schedule: reset 08:28, wake 08:29, baseline 08:30,
    /// monitoring 08:35, selection 08:58, buy 08:59, manage 09:00,
    /// close 09:59, sleep 10:00.
    fn default() -> Self {
        Self {
            starts: [
                hm(8, 28),
                hm(8, 29),
                hm(8, 30),
                hm(8, 35),
                hm(8, 58),
                hm(8, 59),
                hm(9, 0),
                hm(9, 59),
            ],
            sleep: hm(10, 0),
            calendar: TradingCalendar::weekdays_only(),
        }
    }
}

impl Timetable {
    /// Build a timetable from phase start times (in `PhaseId::ALL` order)
    /// and the sleep boundary. Boundaries must be strictly increasing.
    pub fn new(starts: [NaiveTime; 8], sleep: NaiveTime, calendar: TradingCalendar) -> Result<Self> {
        let mut prev: Option<(PhaseId, NaiveTime)> = None;
        for (phase, start) in PhaseId::ALL.iter().zip(starts.iter()) {
            if let Some((prev_phase, prev_start)) = prev {
                if *start <= prev_start {
                    return Err(CoreError::InvalidTimetable(format!(
                        "{phase} start {start} must be after {prev_phase} start {prev_start}"
                    )));
                }
            }
            prev = Some((*phase, *start));
        }
        if sleep <= starts[7] {
            return Err(CoreError::InvalidTimetable(format!(
                "sleep {sleep} must be after SessionClose start {}",
                starts[7]
            )));
        }
        Ok(Self {
            starts,
            sleep,
            calendar,
        })
    }

    #[must_use]
    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// Half-open window `[start, end)` of a phase.
    #[must_use]
    pub fn window(&self, phase: PhaseId) -> (NaiveTime, NaiveTime) {
        let i = phase.index();
        let end = self.starts.get(i + 1).copied().unwrap_or(self.sleep);
        (self.starts[i], end)
    }

    #[must_use]
    pub fn is_trading_day(&self, date: chrono::NaiveDate) -> bool {
        self.calendar.is_trading_day(date)
    }

    /// Phase whose window contains `now`, `None` on non-trading days and
    /// outside the session.
    #[must_use]
    pub fn current_phase(&self, now: DateTime<FixedOffset>) -> Option<PhaseId> {
        if !self.is_trading_day(now.date_naive()) {
            return None;
        }
        let t = now.time();
        PhaseId::ALL.into_iter().find(|phase| {
            let (start, end) = self.window(*phase);
            t >= start && t < end
        })
    }

    /// True once `now` is beyond the wake window but still inside the session.
    #[must_use]
    pub fn is_past_wake_window(&self, now: DateTime<FixedOffset>) -> bool {
        let t = now.time();
        let (_, wake_end) = self.window(PhaseId::SessionInit);
        t >= wake_end && t < self.sleep
    }

    /// True once `now` has reached the end of the management window.
    #[must_use]
    pub fn is_management_over(&self, now: DateTime<FixedOffset>) -> bool {
        now.time() >= self.window(PhaseId::PositionManagement).1
    }

    /// Whole minutes until the next trading day's wake boundary.
    ///
    /// Returns 0 while today's session (wake..sleep) is in progress.
    #[must_use]
    pub fn minutes_until_next_session_start(&self, now: DateTime<FixedOffset>) -> i64 {
        let wake = self.starts[PhaseId::SessionInit.index()];
        let today = now.date_naive();
        let t = now.time();

        let target_date = if self.is_trading_day(today) && t < wake {
            Some(today)
        } else if self.is_trading_day(today) && t < self.sleep {
            return 0;
        } else {
            self.calendar.next_trading_day(today)
        };

        let Some(date) = target_date else {
            return i64::MAX;
        };
        let target = now
            .offset()
            .from_local_datetime(&date.and_time(wake))
            .single()
            .unwrap_or(now);
        (target - now).num_minutes().max(0)
    }

    /// Deadline for the management window on `now`'s date.
    #[must_use]
    pub fn management_deadline(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let (_, end) = self.window(PhaseId::PositionManagement);
        now.offset()
            .from_local_datetime(&now.date_naive().and_time(end))
            .single()
            .unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn kst(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
    }

    #[test]
    fn test_default_windows_are_contiguous() {
        let tt = Timetable::default();
        for pair in PhaseId::ALL.windows(2) {
            assert_eq!(tt.window(pair[0]).1, tt.window(pair[1]).0);
        }
        assert_eq!(tt.window(PhaseId::SessionClose), (hm(9, 59), hm(10, 0)));
    }

    #[test]
    fn test_current_phase_matches_default_schedule() {
        let tt = Timetable::default();
        // 2026-10-19 is Monday
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 8, 27, 59)), None);
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 8, 28, 0)), Some(PhaseId::Reset));
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 8, 29, 30)), Some(PhaseId::SessionInit));
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 8, 30, 0)), Some(PhaseId::Baseline));
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 8, 57, 59)), Some(PhaseId::Monitoring));
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 8, 58, 30)), Some(PhaseId::Selection));
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 8, 59, 0)), Some(PhaseId::BuyExecution));
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 9, 30, 0)), Some(PhaseId::PositionManagement));
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 9, 59, 59)), Some(PhaseId::SessionClose));
        assert_eq!(tt.current_phase(kst(2026, 10, 19, 10, 0, 0)), None);
    }

    #[test]
    fn test_every_window_survives_a_missed_tick() {
        let tt = Timetable::default();
        for phase in PhaseId::ALL {
            let (start, end) = tt.window(phase);
            assert!(end - start >= Duration::seconds(60), "{phase} window too narrow");
        }
    }

    #[test]
    fn test_no_phase_on_weekend() {
        let tt = Timetable::default();
        assert_eq!(tt.current_phase(kst(2026, 10, 24, 8, 30, 0)), None);
    }

    #[test]
    fn test_rejects_unordered_boundaries() {
        let mut starts = Timetable::default().starts;
        starts.swap(3, 4);
        let err = Timetable::new(starts, hm(10, 0), TradingCalendar::weekdays_only());
        assert!(err.is_err());

        let starts = Timetable::default().starts;
        assert!(Timetable::new(starts, hm(9, 59), TradingCalendar::weekdays_only()).is_err());
    }

    #[test]
    fn test_past_wake_window() {
        let tt = Timetable::default();
        assert!(!tt.is_past_wake_window(kst(2026, 10, 19, 8, 29, 45)));
        assert!(tt.is_past_wake_window(kst(2026, 10, 19, 8, 30, 0)));
        assert!(tt.is_past_wake_window(kst(2026, 10, 19, 9, 15, 0)));
        assert!(!tt.is_past_wake_window(kst(2026, 10, 19, 10, 30, 0)));
    }

    #[test]
    fn test_minutes_until_next_session_start() {
        let tt = Timetable::default();
        assert_eq!(tt.minutes_until_next_session_start(kst(2026, 10, 19, 8, 0, 0)), 29);
        assert_eq!(tt.minutes_until_next_session_start(kst(2026, 10, 19, 9, 0, 0)), 0);
        // Friday after the session: next wake is Monday 08:29
        let friday_evening = kst(2026, 10, 23, 18, 29, 0);
        assert_eq!(
            tt.minutes_until_next_session_start(friday_evening),
            (2 * 24 + 14) * 60
        );
    }
}
