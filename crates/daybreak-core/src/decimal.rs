//! Precision-safe numeric types for trading.
//!
//! Prices use `rust_decimal` for exact decimal arithmetic. Share counts are
//! whole numbers on the exchange this bot trades, so `Quantity` wraps `u64`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

/// Round a percentage to two decimal places (banker's rounding).
#[inline]
#[must_use]
pub fn round_pct(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// Price with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with quantities in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn from_krw(won: i64) -> Self {
        Self(Decimal::from(won))
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Percentage change of `self` relative to `base`.
    ///
    /// Returns `None` when `base` is not positive.
    #[inline]
    pub fn pct_from(&self, base: Price) -> Option<Decimal> {
        if !base.is_positive() {
            return None;
        }
        Some((self.0 - base.0) / base.0 * Decimal::ONE_HUNDRED)
    }

    /// Whole shares affordable with `budget` at this price (floor division).
    #[inline]
    pub fn affordable(&self, budget: Decimal) -> Quantity {
        if !self.is_positive() || budget <= Decimal::ZERO {
            return Quantity::ZERO;
        }
        let shares = (budget / self.0).floor();
        Quantity::new(shares.to_u64().unwrap_or(0))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Price {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

/// Whole-share quantity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(pub u64);

impl Quantity {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn new(shares: u64) -> Self {
        Self(shares)
    }

    #[inline]
    pub fn shares(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Notional value: quantity * price.
    #[inline]
    pub fn notional(&self, price: Price) -> Decimal {
        Decimal::from(self.0) * price.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Quantity {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
