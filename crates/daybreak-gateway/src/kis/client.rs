//! REST implementation of [`BrokerGateway`].

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{FixedOffset, NaiveDate, Utc};
use daybreak_core::{
    AccountBalance, Holding, LiveQuote, OrderAck, OrderId, OrderKind, OrderRecord, OrderRequest,
    OrderSide, QuotaUsage, Symbol,
};
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};

use super::auth::TokenManager;
use super::wire::{
    num, quota_from_headers, BalanceSummary, Envelope, ExecutionRow, HoldingRow, OrderOutput,
    OrderableOutput, QuoteOutput,
};
use super::KisConfig;
use crate::broker::{BoxFuture, BrokerGateway, Credential};
use crate::error::{GatewayError, GatewayResult};

const QUOTE_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-price";
const ORDERABLE_PATH: &str = "/uapi/domestic-stock/v1/trading/inquire-psbl-order";
const BALANCE_PATH: &str = "/uapi/domestic-stock/v1/trading/inquire-balance";
const ORDER_PATH: &str = "/uapi/domestic-stock/v1/trading/order-cash";
const EXECUTIONS_PATH: &str = "/uapi/domestic-stock/v1/trading/inquire-daily-ccld";

const QUOTE_TR_ID: &str = "FHKST01010100";

/// KIS open API client.
pub struct KisGateway {
    client: Client,
    config: KisConfig,
    tokens: TokenManager,
    offset: FixedOffset,
    requests: AtomicU64,
    reported_quota: Mutex<Option<QuotaUsage>>,
}

impl KisGateway {
    pub fn new(config: KisConfig) -> GatewayResult<Self> {
        config.validate()?;
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            GatewayError::Config(format!("invalid UTC offset {}", config.utc_offset_hours))
        })?;
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| GatewayError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        let tokens = TokenManager::new(client.clone(), &config);

        info!(mode = %config.mode, base_url = config.base_url(), "KIS gateway configured");

        Ok(Self {
            client,
            config,
            tokens,
            offset,
            requests: AtomicU64::new(0),
            reported_quota: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    fn with_headers(&self, builder: RequestBuilder, credential: &Credential, tr_id: &str) -> RequestBuilder {
        builder
            .header("authorization", credential.authorization())
            .header("appkey", &self.config.app_key)
            .header("appsecret", &self.config.app_secret)
            .header("tr_id", tr_id)
            .header("custtype", "P")
            .header("content-type", "application/json; charset=utf-8")
    }

    pub(super) async fn get(
        &self,
        credential: &Credential,
        path: &str,
        tr_id: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<Envelope> {
        let builder = self.with_headers(self.client.get(self.url(path)), credential, tr_id);
        self.send(builder.query(query), tr_id).await
    }

    pub(super) async fn post(
        &self,
        credential: &Credential,
        path: &str,
        tr_id: &str,
        body: &serde_json::Value,
    ) -> GatewayResult<Envelope> {
        let builder = self.with_headers(self.client.post(self.url(path)), credential, tr_id);
        self.send(builder.json(body), tr_id).await
    }

    async fn send(&self, builder: RequestBuilder, tr_id: &str) -> GatewayResult<Envelope> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::HttpClient(format!("{tr_id} timed out: {e}"))
            } else {
                GatewayError::HttpClient(format!("{tr_id} request failed: {e}"))
            }
        })?;

        if let Some((used, limit)) = quota_from_headers(response.headers()) {
            *self.reported_quota.lock() = Some(QuotaUsage::new(used, limit));
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::HttpClient(format!("{tr_id} HTTP {status}: {body}")));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("{tr_id}: {e}")))?;
        debug!(tr_id, rt_cd = %envelope.rt_cd, msg = %envelope.msg1.trim(), "KIS response");
        envelope.ensure_ok()
    }

    fn account_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("CANO", self.config.account.cano.clone()),
            ("ACNT_PRDT_CD", self.config.account.product_code.clone()),
        ]
    }

    async fn fetch_quote(&self, credential: &Credential, symbol: &Symbol) -> GatewayResult<LiveQuote> {
        let query = [
            ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
            ("FID_INPUT_ISCD", symbol.to_string()),
        ];
        let envelope = self.get(credential, QUOTE_PATH, QUOTE_TR_ID, &query).await?;
        let output: QuoteOutput = envelope.output()?;
        output.into_quote(symbol, Utc::now().with_timezone(&self.offset))
    }

    async fn fetch_orderable_cash(&self, credential: &Credential) -> GatewayResult<Decimal> {
        let mut query = self.account_query();
        query.extend([
            ("PDNO", String::new()),
            ("ORD_UNPR", String::new()),
            ("ORD_DVSN", "01".to_string()),
            ("CMA_EVLU_AMT_ICLD_YN", "N".to_string()),
            ("OVRS_ICLD_YN", "N".to_string()),
        ]);
        let tr_id = self.config.mode.tr_id("TTC8908R");
        let envelope = self.get(credential, ORDERABLE_PATH, &tr_id, &query).await?;
        let output: OrderableOutput = envelope.output()?;
        num("ord_psbl_cash", &output.ord_psbl_cash)
    }

    async fn fetch_balance_sheet(&self, credential: &Credential) -> GatewayResult<Envelope> {
        let mut query = self.account_query();
        query.extend([
            ("AFHR_FLPR_YN", "N".to_string()),
            ("OFL_YN", String::new()),
            ("INQR_DVSN", "02".to_string()),
            ("UNPR_DVSN", "01".to_string()),
            ("FUND_STTL_ICLD_YN", "N".to_string()),
            ("FNCG_AMT_AUTO_RDPT_YN", "N".to_string()),
            ("PRCS_DVSN", "00".to_string()),
            ("CTX_AREA_FK100", String::new()),
            ("CTX_AREA_NK100", String::new()),
        ]);
        let tr_id = self.config.mode.tr_id("TTC8434R");
        self.get(credential, BALANCE_PATH, &tr_id, &query).await
    }

    async fn fetch_balance(&self, credential: &Credential) -> GatewayResult<AccountBalance> {
        let available_cash = self.fetch_orderable_cash(credential).await?;
        let sheet = self.fetch_balance_sheet(credential).await?;
        let summary = sheet
            .output2_rows::<BalanceSummary>()?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NoData("balance summary missing".to_string()))?;
        summary.into_balance(available_cash)
    }

    async fn fetch_holdings(&self, credential: &Credential) -> GatewayResult<Vec<Holding>> {
        let sheet = self.fetch_balance_sheet(credential).await?;
        let rows: Vec<HoldingRow> = sheet.output1()?;
        let mut holdings = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(holding) = row.into_holding()? {
                holdings.push(holding);
            }
        }
        Ok(holdings)
    }

    async fn submit_order(&self, credential: &Credential, request: &OrderRequest) -> GatewayResult<OrderAck> {
        let (ord_dvsn, unit_price) = match request.kind {
            OrderKind::Market => ("01", "0".to_string()),
            OrderKind::Limit => {
                let price = request.limit_price.ok_or_else(|| {
                    GatewayError::Config("limit order without a limit price".to_string())
                })?;
                ("00", price.inner().trunc().to_string())
            }
        };
        let body = json!({
            "CANO": self.config.account.cano,
            "ACNT_PRDT_CD": self.config.account.product_code,
            "PDNO": request.symbol.as_str(),
            "ORD_DVSN": ord_dvsn,
            "ORD_QTY": request.quantity.shares().to_string(),
            "ORD_UNPR": unit_price,
        });
        let tr_id = match request.side {
            OrderSide::Buy => self.config.mode.tr_id("TTC0802U"),
            OrderSide::Sell => self.config.mode.tr_id("TTC0801U"),
        };

        let envelope = self.post(credential, ORDER_PATH, &tr_id, &body).await?;
        let message = envelope.msg1.trim().to_string();
        let message = (!message.is_empty()).then_some(message);
        let output: OrderOutput = envelope.output()?;
        if output.odno.trim().is_empty() {
            return Err(GatewayError::Decode("order accepted without an order number".to_string()));
        }

        info!(
            symbol = %request.symbol,
            side = %request.side,
            quantity = request.quantity.shares(),
            order_id = %output.odno.trim(),
            "Order accepted"
        );
        Ok(OrderAck {
            order_id: OrderId::new(output.odno.trim()),
            order_time: (!output.ord_tmd.trim().is_empty()).then(|| output.ord_tmd.trim().to_string()),
            message,
        })
    }

    async fn fetch_orders(
        &self,
        credential: &Credential,
        from: NaiveDate,
        to: NaiveDate,
    ) -> GatewayResult<Vec<OrderRecord>> {
        let mut query = self.account_query();
        query.extend([
            ("INQR_STRT_DT", from.format("%Y%m%d").to_string()),
            ("INQR_END_DT", to.format("%Y%m%d").to_string()),
            ("SLL_BUY_DVSN_CD", "00".to_string()),
            ("INQR_DVSN", "00".to_string()),
            ("PDNO", String::new()),
            ("CCLD_DVSN", "00".to_string()),
            ("ORD_GNO_BRNO", String::new()),
            ("ODNO", String::new()),
            ("INQR_DVSN_3", "00".to_string()),
            ("INQR_DVSN_1", String::new()),
            ("CTX_AREA_FK100", String::new()),
            ("CTX_AREA_NK100", String::new()),
        ]);
        let tr_id = self.config.mode.tr_id("TTC8001R");
        let envelope = self.get(credential, EXECUTIONS_PATH, &tr_id, &query).await?;
        let rows: Vec<ExecutionRow> = envelope.output1()?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_record(self.offset) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping undecodable execution row"),
            }
        }
        Ok(records)
    }

    fn quota(&self) -> QuotaUsage {
        if let Some(reported) = *self.reported_quota.lock() {
            return reported;
        }
        QuotaUsage::new(self.requests.load(Ordering::Relaxed), self.config.daily_quota)
    }
}

impl BrokerGateway for KisGateway {
    fn authenticate(&self) -> BoxFuture<'_, GatewayResult<Credential>> {
        Box::pin(self.tokens.credential())
    }

    fn get_quote<'a>(
        &'a self,
        credential: &'a Credential,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, GatewayResult<LiveQuote>> {
        Box::pin(self.fetch_quote(credential, symbol))
    }

    fn get_balance<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BoxFuture<'a, GatewayResult<AccountBalance>> {
        Box::pin(self.fetch_balance(credential))
    }

    fn get_positions<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BoxFuture<'a, GatewayResult<Vec<Holding>>> {
        Box::pin(self.fetch_holdings(credential))
    }

    fn place_order<'a>(
        &'a self,
        credential: &'a Credential,
        request: &'a OrderRequest,
    ) -> BoxFuture<'a, GatewayResult<OrderAck>> {
        Box::pin(self.submit_order(credential, request))
    }

    fn list_orders<'a>(
        &'a self,
        credential: &'a Credential,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxFuture<'a, GatewayResult<Vec<OrderRecord>>> {
        Box::pin(self.fetch_orders(credential, from, to))
    }

    fn get_quota_usage<'a>(
        &'a self,
        _credential: &'a Credential,
    ) -> BoxFuture<'a, GatewayResult<QuotaUsage>> {
        Box::pin(async move { Ok(self.quota()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kis::{AccountNo, TradingMode};
    use std::time::Duration;

    fn config() -> KisConfig {
        KisConfig {
            mode: TradingMode::Virtual,
            base_url: Some("http://127.0.0.1:9".to_string()),
            app_key: "key".to_string(),
            app_secret: "secret".to_string(),
            account: AccountNo::parse("12345678-01").unwrap(),
            token_cache: None,
            http_timeout: Duration::from_secs(1),
            daily_quota: 20_000,
            utc_offset_hours: 9,
        }
    }

    #[test]
    fn test_rejects_placeholder_credentials() {
        let mut cfg = config();
        cfg.app_key = "DEFAULT_NOT_SET".to_string();
        assert!(matches!(KisGateway::new(cfg), Err(GatewayError::Auth(_))));
    }

    #[test]
    fn test_quota_falls_back_to_local_counter() {
        let gateway = KisGateway::new(config()).unwrap();
        gateway.requests.fetch_add(3, Ordering::Relaxed);
        assert_eq!(gateway.quota(), QuotaUsage::new(3, 20_000));

        *gateway.reported_quota.lock() = Some(QuotaUsage::new(120, 10_000));
        assert_eq!(gateway.quota(), QuotaUsage::new(120, 10_000));
    }

    #[test]
    fn test_urls_use_override() {
        let gateway = KisGateway::new(config()).unwrap();
        assert_eq!(
            gateway.url(QUOTE_PATH),
            "http://127.0.0.1:9/uapi/domestic-stock/v1/quotations/inquire-price"
        );
    }
}
