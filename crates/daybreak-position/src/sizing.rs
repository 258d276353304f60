//! Buy sizing.

use daybreak_core::{Price, Quantity};
use rust_decimal::Decimal;

/// Split `cash` evenly over `prices` and buy whole shares of each.
///
/// Per-stock budget is `floor(cash / n)`; quantity is
/// `floor(budget / price)`. Cash that cannot buy a whole share stays unused.
#[must_use]
pub fn allocate(cash: Decimal, prices: &[Price]) -> Vec<Quantity> {
    if prices.is_empty() {
        return Vec::new();
    }
    if cash <= Decimal::ZERO {
        return vec![Quantity::ZERO; prices.len()];
    }
    let per_stock = (cash / Decimal::from(prices.len())).floor();
    prices.iter().map(|price| price.affordable(per_stock)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn krw(prices: &[i64]) -> Vec<Price> {
        prices.iter().map(|&p| Price::from_krw(p)).collect()
    }

    #[test]
    fn test_even_split_uses_floor_division() {
        let qty = allocate(dec!(300000), &krw(&[100_000, 50_000, 30_000]));
        assert_eq!(qty, vec![Quantity::new(1), Quantity::new(2), Quantity::new(3)]);
    }

    #[test]
    fn test_fractional_budget_is_not_rounded_up() {
        // 100,000 / 3 = 33,333 per stock; 33,333 / 40,000 = 0.83 shares.
        let qty = allocate(dec!(100000), &krw(&[40_000, 10_000, 33_334]));
        assert_eq!(qty, vec![Quantity::ZERO, Quantity::new(3), Quantity::ZERO]);
    }

    #[test]
    fn test_no_cash_or_no_symbols() {
        assert!(allocate(dec!(1000000), &[]).is_empty());
        assert_eq!(
            allocate(Decimal::ZERO, &krw(&[10_000, 20_000])),
            vec![Quantity::ZERO, Quantity::ZERO]
        );
    }
}
