//! Order-related types and identifiers.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::{Price, Quantity};
use crate::market::Symbol;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order kind. The bot only ever submits market orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    #[default]
    Market,
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Broker-assigned order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub quantity: Quantity,
    pub kind: OrderKind,
    /// Only meaningful for limit orders.
    pub limit_price: Option<Price>,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: OrderSide, quantity: Quantity) -> Self {
        Self {
            symbol,
            side,
            quantity,
            kind: OrderKind::Market,
            limit_price: None,
        }
    }
}

/// Broker acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    /// Broker-side order time (HHMMSS) when reported.
    pub order_time: Option<String>,
    pub message: Option<String>,
}

/// One row of the broker's order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub name: String,
    pub side: OrderSide,
    pub ordered_qty: Quantity,
    pub filled_qty: Quantity,
    pub avg_fill_price: Price,
    pub ordered_at: Option<DateTime<FixedOffset>>,
}

impl OrderRecord {
    /// An order is unfilled while its filled quantity is below the ordered quantity.
    #[must_use]
    pub fn is_unfilled(&self) -> bool {
        self.filled_qty < self.ordered_qty
    }

    /// Remaining quantity (ordered - filled).
    #[must_use]
    pub fn remaining(&self) -> Quantity {
        Quantity::new(self.ordered_qty.shares().saturating_sub(self.filled_qty.shares()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ordered: u64, filled: u64) -> OrderRecord {
        OrderRecord {
            order_id: OrderId::new("0000117057"),
            symbol: Symbol::new("005930"),
            name: "Samsung Electronics".to_string(),
            side: OrderSide::Buy,
            ordered_qty: Quantity::new(ordered),
            filled_qty: Quantity::new(filled),
            avg_fill_price: Price::from_krw(71_000),
            ordered_at: None,
        }
    }

    #[test]
    fn test_unfilled_detection() {
        assert!(record(10, 3).is_unfilled());
        assert!(record(10, 0).is_unfilled());
        assert!(!record(10, 10).is_unfilled());
        assert_eq!(record(10, 3).remaining(), Quantity::new(7));
    }

    #[test]
    fn test_side_display() {
        assert_eq!(OrderSide::Buy.to_string(), "buy");
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }
}
