//! Trading-day calendar.
//!
//! A trading day is a weekday that the pluggable [`HolidayPredicate`] does
//! not exclude. The default predicate excludes nothing.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Extra exclusion applied on top of the weekday rule.
pub trait HolidayPredicate: Send + Sync + fmt::Debug {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// Weekday-only calendar: no extra exclusions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolidays;

impl HolidayPredicate for NoHolidays {
    fn is_holiday(&self, _date: NaiveDate) -> bool {
        false
    }
}

/// Explicit list of market holidays.
#[derive(Debug, Clone, Default)]
pub struct FixedHolidays {
    dates: BTreeSet<NaiveDate>,
}

impl FixedHolidays {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl HolidayPredicate for FixedHolidays {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }
}

/// Upper bound on how far the calendar walks looking for a trading day.
const MAX_SCAN_DAYS: i64 = 31;

#[derive(Debug, Clone)]
pub struct TradingCalendar {
    holidays: Arc<dyn HolidayPredicate>,
}

impl Default for TradingCalendar {
    fn default() -> Self {
        Self::weekdays_only()
    }
}

impl TradingCalendar {
    pub fn new(holidays: Arc<dyn HolidayPredicate>) -> Self {
        Self { holidays }
    }

    pub fn weekdays_only() -> Self {
        Self::new(Arc::new(NoHolidays))
    }

    #[must_use]
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.is_holiday(date)
    }

    /// Most recent trading day strictly before `date`.
    ///
    /// Monday maps to the preceding Friday unless that Friday is a holiday.
    #[must_use]
    pub fn prior_trading_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        (1..=MAX_SCAN_DAYS)
            .map(|back| date - Duration::days(back))
            .find(|d| self.is_trading_day(*d))
    }

    /// First trading day strictly after `date`.
    #[must_use]
    pub fn next_trading_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        (1..=MAX_SCAN_DAYS)
            .map(|ahead| date + Duration::days(ahead))
            .find(|d| self.is_trading_day(*d))
    }
}
