//! Wire formats of the KIS REST API.
//!
//! Every numeric field arrives as a string; empty strings mean zero.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use daybreak_core::{
    AccountBalance, DailyBar, Holding, LiveQuote, OrderId, OrderRecord, OrderSide, Price, Quantity,
    Symbol,
};
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

/// Traded value in quote responses is reported in millions of won.
const TRADED_VALUE_UNIT: i64 = 1_000_000;

/// Common response envelope.
#[derive(Debug, Deserialize)]
pub(super) struct Envelope {
    #[serde(default)]
    pub rt_cd: String,
    #[serde(default)]
    pub msg_cd: String,
    #[serde(default)]
    pub msg1: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub output1: Value,
    #[serde(default)]
    pub output2: Value,
}

impl Envelope {
    /// `rt_cd == "0"` means success; anything else is a broker-level rejection.
    pub fn ensure_ok(self) -> GatewayResult<Self> {
        if self.rt_cd == "0" {
            Ok(self)
        } else {
            Err(GatewayError::Api {
                code: if self.msg_cd.is_empty() {
                    self.rt_cd
                } else {
                    self.msg_cd
                },
                message: self.msg1.trim().to_string(),
            })
        }
    }

    pub fn output<T: DeserializeOwned>(&self) -> GatewayResult<T> {
        decode(&self.output, "output")
    }

    pub fn output1<T: DeserializeOwned>(&self) -> GatewayResult<T> {
        decode(&self.output1, "output1")
    }

    /// `output2` is an array on some endpoints and a single object on others.
    pub fn output2_rows<T: DeserializeOwned>(&self) -> GatewayResult<Vec<T>> {
        match &self.output2 {
            Value::Null => Ok(Vec::new()),
            Value::Array(_) => decode(&self.output2, "output2"),
            other => Ok(vec![decode(other, "output2")?]),
        }
    }
}

fn decode<T: DeserializeOwned>(value: &Value, field: &str) -> GatewayResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| GatewayError::Decode(format!("{field}: {e}")))
}

/// Parse a numeric string; empty means zero.
pub(super) fn num(field: &'static str, raw: &str) -> GatewayResult<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    raw.parse::<Decimal>()
        .map_err(|e| GatewayError::Decode(format!("{field}={raw:?}: {e}")))
}

fn count(field: &'static str, raw: &str) -> GatewayResult<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<u64>()
        .map_err(|e| GatewayError::Decode(format!("{field}={raw:?}: {e}")))
}

fn yyyymmdd(field: &'static str, raw: &str) -> GatewayResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d")
        .map_err(|e| GatewayError::Decode(format!("{field}={raw:?}: {e}")))
}

/// `FHKST01010100` inquire-price output.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct QuoteOutput {
    pub stck_prpr: String,
    pub prdy_ctrt: String,
    pub acml_vol: String,
    pub acml_tr_pbmn: String,
}

impl QuoteOutput {
    pub fn into_quote(self, symbol: &Symbol, sampled_at: DateTime<FixedOffset>) -> GatewayResult<LiveQuote> {
        let price = Price::new(num("stck_prpr", &self.stck_prpr)?);
        if !price.is_positive() {
            return Err(GatewayError::NoData(format!("no current price for {symbol}")));
        }
        Ok(LiveQuote {
            symbol: symbol.clone(),
            price,
            change_pct: num("prdy_ctrt", &self.prdy_ctrt)?,
            volume: count("acml_vol", &self.acml_vol)?,
            traded_value: num("acml_tr_pbmn", &self.acml_tr_pbmn)? * Decimal::from(TRADED_VALUE_UNIT),
            sampled_at,
        })
    }
}

/// `TTTC8908R` inquire-psbl-order output.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct OrderableOutput {
    pub ord_psbl_cash: String,
}

/// `TTTC8434R` inquire-balance per-holding row (output1).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct HoldingRow {
    pub pdno: String,
    pub prdt_name: String,
    pub hldg_qty: String,
    pub pchs_avg_pric: String,
    pub prpr: String,
    pub evlu_amt: String,
    pub evlu_pfls_amt: String,
    pub evlu_pfls_rt: String,
}

impl HoldingRow {
    /// `None` for rows with no remaining quantity.
    pub fn into_holding(self) -> GatewayResult<Option<Holding>> {
        let quantity = Quantity::new(count("hldg_qty", &self.hldg_qty)?);
        if quantity.is_zero() {
            return Ok(None);
        }
        Ok(Some(Holding {
            symbol: Symbol::parse(self.pdno.trim())
                .map_err(|e| GatewayError::Decode(e.to_string()))?,
            name: self.prdt_name.trim().to_string(),
            quantity,
            avg_price: Price::new(num("pchs_avg_pric", &self.pchs_avg_pric)?),
            current_price: Price::new(num("prpr", &self.prpr)?),
            eval_amount: num("evlu_amt", &self.evlu_amt)?,
            pnl: num("evlu_pfls_amt", &self.evlu_pfls_amt)?,
            pnl_pct: num("evlu_pfls_rt", &self.evlu_pfls_rt)?,
        }))
    }
}

/// `TTTC8434R` inquire-balance account summary (output2).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct BalanceSummary {
    pub dnca_tot_amt: String,
    pub tot_evlu_amt: String,
    pub nass_amt: String,
    pub pchs_amt_smtl_amt: String,
    pub evlu_pfls_smtl_amt: String,
}

impl BalanceSummary {
    pub fn into_balance(self, available_cash: Decimal) -> GatewayResult<AccountBalance> {
        let purchase_amount = num("pchs_amt_smtl_amt", &self.pchs_amt_smtl_amt)?;
        let unrealized_pnl = num("evlu_pfls_smtl_amt", &self.evlu_pfls_smtl_amt)?;
        let pnl_pct = if purchase_amount > Decimal::ZERO {
            (unrealized_pnl / purchase_amount * Decimal::ONE_HUNDRED).round_dp(2)
        } else {
            Decimal::ZERO
        };
        Ok(AccountBalance {
            available_cash,
            deposit: num("dnca_tot_amt", &self.dnca_tot_amt)?,
            total_value: num("tot_evlu_amt", &self.tot_evlu_amt)?,
            net_asset: num("nass_amt", &self.nass_amt)?,
            purchase_amount,
            unrealized_pnl,
            pnl_pct,
        })
    }
}

/// `TTTC0802U`/`TTTC0801U` order-cash output.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct OrderOutput {
    #[serde(rename = "ODNO")]
    pub odno: String,
    #[serde(rename = "ORD_TMD")]
    pub ord_tmd: String,
}

/// `TTTC8001R` inquire-daily-ccld row (output1).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ExecutionRow {
    pub odno: String,
    pub pdno: String,
    pub prdt_name: String,
    pub sll_buy_dvsn_cd: String,
    pub ord_qty: String,
    pub tot_ccld_qty: String,
    pub avg_prvs: String,
    pub ord_dt: String,
    pub ord_tmd: String,
}

impl ExecutionRow {
    pub fn into_record(self, offset: FixedOffset) -> GatewayResult<OrderRecord> {
        let side = match self.sll_buy_dvsn_cd.trim() {
            "01" => OrderSide::Sell,
            "02" => OrderSide::Buy,
            other => {
                return Err(GatewayError::Decode(format!(
                    "unknown sll_buy_dvsn_cd {other:?}"
                )))
            }
        };
        let ordered_at = ordered_at(&self.ord_dt, &self.ord_tmd, offset);
        Ok(OrderRecord {
            order_id: OrderId::new(self.odno.trim()),
            symbol: Symbol::parse(self.pdno.trim())
                .map_err(|e| GatewayError::Decode(e.to_string()))?,
            name: self.prdt_name.trim().to_string(),
            side,
            ordered_qty: Quantity::new(count("ord_qty", &self.ord_qty)?),
            filled_qty: Quantity::new(count("tot_ccld_qty", &self.tot_ccld_qty)?),
            avg_fill_price: Price::new(num("avg_prvs", &self.avg_prvs)?),
            ordered_at,
        })
    }
}

fn ordered_at(date: &str, time: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H%M%S").ok()?;
    offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
}

/// `FHKST03010100` daily item chart row (output2).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ChartRow {
    pub stck_bsop_date: String,
    pub stck_clpr: String,
    pub stck_oprc: String,
    pub stck_hgpr: String,
    pub stck_lwpr: String,
    pub acml_vol: String,
    pub acml_tr_pbmn: String,
}

impl ChartRow {
    /// Rows past the last trading day come back empty; skip them.
    pub fn into_bar(self) -> GatewayResult<Option<DailyBar>> {
        if self.stck_bsop_date.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(DailyBar {
            date: yyyymmdd("stck_bsop_date", &self.stck_bsop_date)?,
            open: Price::new(num("stck_oprc", &self.stck_oprc)?),
            high: Price::new(num("stck_hgpr", &self.stck_hgpr)?),
            low: Price::new(num("stck_lwpr", &self.stck_lwpr)?),
            close: Price::new(num("stck_clpr", &self.stck_clpr)?),
            volume: count("acml_vol", &self.acml_vol)?,
            traded_value: num("acml_tr_pbmn", &self.acml_tr_pbmn)?,
        }))
    }
}

/// Quota counters if the response carried them (`tr_cont_max`/`tr_cont`).
pub(super) fn quota_from_headers(headers: &HeaderMap) -> Option<(u64, u64)> {
    let read = |name: &str| -> Option<u64> { headers.get(name)?.to_str().ok()?.trim().parse().ok() };
    let limit = read("tr_cont_max")?;
    let used = read("tr_cont")?;
    Some((used, limit))
}
