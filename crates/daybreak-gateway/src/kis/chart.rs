//! Prior-close lookups over the daily item chart endpoint.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use daybreak_core::{DailyBar, Symbol};

use super::client::KisGateway;
use super::wire::ChartRow;
use crate::broker::{BoxFuture, MarketDataProvider};
use crate::error::{GatewayError, GatewayResult};

const CHART_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice";
const CHART_TR_ID: &str = "FHKST03010100";

/// Calendar days requested before the target date; covers long holiday runs.
const LOOKBACK_DAYS: i64 = 14;

/// [`MarketDataProvider`] backed by the broker's own chart endpoint.
///
/// Shares the gateway's HTTP client and token manager.
#[derive(Clone)]
pub struct KisDailyChart {
    gateway: Arc<KisGateway>,
}

impl KisDailyChart {
    pub fn new(gateway: Arc<KisGateway>) -> Self {
        Self { gateway }
    }

    async fn fetch(&self, symbol: &Symbol, date: NaiveDate) -> GatewayResult<DailyBar> {
        let credential = self.gateway.tokens().credential().await?;
        let from = date - Duration::days(LOOKBACK_DAYS);
        let query = [
            ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
            ("FID_INPUT_ISCD", symbol.to_string()),
            ("FID_INPUT_DATE_1", from.format("%Y%m%d").to_string()),
            ("FID_INPUT_DATE_2", date.format("%Y%m%d").to_string()),
            ("FID_PERIOD_DIV_CODE", "D".to_string()),
            ("FID_ORG_ADJ_PRC", "0".to_string()),
        ];
        let envelope = self
            .gateway
            .get(&credential, CHART_PATH, CHART_TR_ID, &query)
            .await?;

        let mut bars = Vec::new();
        for row in envelope.output2_rows::<ChartRow>()? {
            if let Some(bar) = row.into_bar()? {
                bars.push(bar);
            }
        }
        latest_on_or_before(bars, date)
            .ok_or_else(|| GatewayError::NoData(format!("no daily bar for {symbol} on or before {date}")))
    }
}

/// Latest bar dated on or before `date`.
fn latest_on_or_before(bars: Vec<DailyBar>, date: NaiveDate) -> Option<DailyBar> {
    bars.into_iter()
        .filter(|bar| bar.date <= date)
        .max_by_key(|bar| bar.date)
}

impl MarketDataProvider for KisDailyChart {
    fn get_prior_close<'a>(
        &'a self,
        symbol: &'a Symbol,
        date: NaiveDate,
    ) -> BoxFuture<'a, GatewayResult<DailyBar>> {
        Box::pin(self.fetch(symbol, date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybreak_core::Price;
    use rust_decimal::Decimal;

    fn bar(date: NaiveDate, close: i64) -> DailyBar {
        let close = Price::from_krw(close);
        DailyBar {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
            traded_value: Decimal::ZERO,
        }
    }

    #[test]
    fn test_picks_latest_bar_not_after_date() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 10, day).unwrap();
        let bars = vec![bar(d(15), 100), bar(d(16), 110), bar(d(19), 120), bar(d(14), 90)];
        let picked = latest_on_or_before(bars, d(16)).unwrap();
        assert_eq!(picked.date, d(16));
        assert_eq!(picked.close, Price::from_krw(110));
    }

    #[test]
    fn test_no_bar_before_date() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 10, day).unwrap();
        assert!(latest_on_or_before(vec![bar(d(19), 120)], d(16)).is_none());
    }
}
