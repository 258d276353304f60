//! Universe reference data and market samples.

use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::Price;
use crate::error::{CoreError, Result};

/// Exchange ticker code (e.g. `005930`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, rejecting empty or whitespace-containing codes.
    pub fn parse(code: impl Into<String>) -> Result<Self> {
        let code = code.into();
        if code.is_empty() || code.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidSymbol(code));
        }
        Ok(Self(code))
    }

    /// Create a symbol without validation. Intended for tests and literals.
    pub fn new(code: &str) -> Self {
        Self(code.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One tradable symbol in the fixed universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    pub name: String,
}

impl Instrument {
    pub fn new(symbol: Symbol, name: impl Into<String>) -> Self {
        Self {
            symbol,
            name: name.into(),
        }
    }
}

/// Daily OHLCV bar returned by a market data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: u64,
    /// Traded value in KRW.
    pub traded_value: Decimal,
}

/// Prior-session closing data for one instrument, captured once per day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub symbol: Symbol,
    pub name: String,
    /// Session the bar belongs to (the prior trading day).
    pub session_date: NaiveDate,
    pub prior_close: Price,
    pub prior_volume: u64,
    pub prior_open: Price,
    pub prior_high: Price,
    pub prior_low: Price,
    pub prior_traded_value: Decimal,
    pub captured_at: DateTime<FixedOffset>,
}

impl BaselineSnapshot {
    pub fn from_bar(instrument: &Instrument, bar: DailyBar, captured_at: DateTime<FixedOffset>) -> Self {
        Self {
            symbol: instrument.symbol.clone(),
            name: instrument.name.clone(),
            session_date: bar.date,
            prior_close: bar.close,
            prior_volume: bar.volume,
            prior_open: bar.open,
            prior_high: bar.high,
            prior_low: bar.low,
            prior_traded_value: bar.traded_value,
            captured_at,
        }
    }
}

/// One polling sample of a symbol's live price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveQuote {
    pub symbol: Symbol,
    pub price: Price,
    /// Change vs. prior close as reported by the broker, in percent.
    pub change_pct: Decimal,
    /// Accumulated session volume.
    pub volume: u64,
    /// Accumulated session traded value in KRW.
    pub traded_value: Decimal,
    pub sampled_at: DateTime<FixedOffset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_parse_rejects_blank() {
        assert!(Symbol::parse("005930").is_ok());
        assert!(Symbol::parse("").is_err());
        assert!(Symbol::parse("00 5930").is_err());
    }

    #[test]
    fn test_symbol_ordering_is_lexicographic() {
        let mut symbols = vec![Symbol::new("035420"), Symbol::new("000660"), Symbol::new("005930")];
        symbols.sort();
        assert_eq!(symbols[0].as_str(), "000660");
        assert_eq!(symbols[2].as_str(), "035420");
    }
}
