//! Scriptable in-memory broker and market data for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use daybreak_core::{
    AccountBalance, DailyBar, Holding, LiveQuote, OrderAck, OrderId, OrderRecord, OrderRequest,
    OrderSide, Price, QuotaUsage, Quantity, Symbol,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::broker::{BoxFuture, BrokerGateway, Credential, MarketDataProvider};
use crate::error::{GatewayError, GatewayResult};

/// Mock broker for testing.
///
/// Prices are scripted per symbol; orders are recorded and, unless told to
/// fail, filled in full at the current scripted price.
#[derive(Debug)]
pub struct MockBroker {
    auth_ok: AtomicBool,
    auth_calls: AtomicUsize,
    prices: Mutex<HashMap<Symbol, Price>>,
    volumes: Mutex<HashMap<Symbol, (u64, Decimal)>>,
    failing_quotes: Mutex<HashSet<Symbol>>,
    quote_delay: Mutex<Option<Duration>>,
    quote_calls: AtomicUsize,
    balance: Mutex<Option<AccountBalance>>,
    holdings: Mutex<Vec<Holding>>,
    /// Remaining forced failures per (symbol, side).
    failing_orders: Mutex<HashMap<(Symbol, OrderSide), u32>>,
    /// Symbols whose buys are accepted but left unfilled.
    unfilled: Mutex<HashSet<Symbol>>,
    orders: Mutex<Vec<OrderRequest>>,
    history: Mutex<Vec<OrderRecord>>,
    quota_used: AtomicU64,
    quota_limit: AtomicU64,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            auth_ok: AtomicBool::new(true),
            auth_calls: AtomicUsize::new(0),
            prices: Mutex::new(HashMap::new()),
            volumes: Mutex::new(HashMap::new()),
            failing_quotes: Mutex::new(HashSet::new()),
            quote_delay: Mutex::new(None),
            quote_calls: AtomicUsize::new(0),
            balance: Mutex::new(Some(AccountBalance::default())),
            holdings: Mutex::new(Vec::new()),
            failing_orders: Mutex::new(HashMap::new()),
            unfilled: Mutex::new(HashSet::new()),
            orders: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            quota_used: AtomicU64::new(0),
            quota_limit: AtomicU64::new(10_000),
        }
    }

    pub fn set_auth_ok(&self, ok: bool) {
        self.auth_ok.store(ok, Ordering::SeqCst);
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn set_price(&self, symbol: &Symbol, price: Price) {
        self.prices.lock().insert(symbol.clone(), price);
    }

    pub fn set_volume(&self, symbol: &Symbol, volume: u64, traded_value: Decimal) {
        self.volumes
            .lock()
            .insert(symbol.clone(), (volume, traded_value));
    }

    pub fn fail_quotes(&self, symbol: &Symbol, fail: bool) {
        let mut failing = self.failing_quotes.lock();
        if fail {
            failing.insert(symbol.clone());
        } else {
            failing.remove(symbol);
        }
    }

    pub fn set_quote_delay(&self, delay: Option<Duration>) {
        *self.quote_delay.lock() = delay;
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn set_available_cash(&self, cash: Decimal) {
        let mut balance = self.balance.lock();
        let b = balance.get_or_insert_with(AccountBalance::default);
        b.available_cash = cash;
        b.deposit = cash;
        b.total_value = cash;
    }

    /// Make `get_balance` fail (`None`) or return the given balance.
    pub fn set_balance(&self, balance: Option<AccountBalance>) {
        *self.balance.lock() = balance;
    }

    pub fn set_holdings(&self, holdings: Vec<Holding>) {
        *self.holdings.lock() = holdings;
    }

    /// Reject the next `times` orders for `symbol` on `side`.
    pub fn fail_orders(&self, symbol: &Symbol, side: OrderSide, times: u32) {
        self.failing_orders
            .lock()
            .insert((symbol.clone(), side), times);
    }

    pub fn leave_unfilled(&self, symbol: &Symbol) {
        self.unfilled.lock().insert(symbol.clone());
    }

    /// Orders accepted so far.
    pub fn get_orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().clone()
    }

    pub fn orders_for(&self, symbol: &Symbol, side: OrderSide) -> Vec<OrderRequest> {
        self.orders
            .lock()
            .iter()
            .filter(|o| &o.symbol == symbol && o.side == side)
            .cloned()
            .collect()
    }

    pub fn clear_orders(&self) {
        self.orders.lock().clear();
        self.history.lock().clear();
    }

    pub fn set_quota(&self, used: u64, limit: u64) {
        self.quota_used.store(used, Ordering::SeqCst);
        self.quota_limit.store(limit, Ordering::SeqCst);
    }

    fn take_forced_failure(&self, symbol: &Symbol, side: OrderSide) -> bool {
        let mut failing = self.failing_orders.lock();
        match failing.get_mut(&(symbol.clone(), side)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl BrokerGateway for MockBroker {
    fn authenticate(&self) -> BoxFuture<'_, GatewayResult<Credential>> {
        Box::pin(async move {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);
            if !self.auth_ok.load(Ordering::SeqCst) {
                return Err(GatewayError::Auth("mock credentials rejected".to_string()));
            }
            Ok(Credential {
                access_token: "mock-token".to_string(),
                token_type: "Bearer".to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(23),
            })
        })
    }

    fn get_quote<'a>(
        &'a self,
        _credential: &'a Credential,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, GatewayResult<LiveQuote>> {
        Box::pin(async move {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            self.quota_used.fetch_add(1, Ordering::SeqCst);
            let delay = *self.quote_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing_quotes.lock().contains(symbol) {
                return Err(GatewayError::HttpClient(format!("mock quote failure for {symbol}")));
            }
            let price = self
                .prices
                .lock()
                .get(symbol)
                .copied()
                .ok_or_else(|| GatewayError::NoData(format!("no scripted price for {symbol}")))?;
            let (volume, traded_value) = self
                .volumes
                .lock()
                .get(symbol)
                .copied()
                .unwrap_or((0, Decimal::ZERO));
            let kst = chrono::FixedOffset::east_opt(9 * 3600)
                .ok_or_else(|| GatewayError::Config("invalid offset".to_string()))?;
            Ok(LiveQuote {
                symbol: symbol.clone(),
                price,
                change_pct: Decimal::ZERO,
                volume,
                traded_value,
                sampled_at: Utc::now().with_timezone(&kst),
            })
        })
    }

    fn get_balance<'a>(
        &'a self,
        _credential: &'a Credential,
    ) -> BoxFuture<'a, GatewayResult<AccountBalance>> {
        Box::pin(async move {
            self.balance
                .lock()
                .clone()
                .ok_or_else(|| GatewayError::HttpClient("mock balance unavailable".to_string()))
        })
    }

    fn get_positions<'a>(
        &'a self,
        _credential: &'a Credential,
    ) -> BoxFuture<'a, GatewayResult<Vec<Holding>>> {
        Box::pin(async move { Ok(self.holdings.lock().clone()) })
    }

    fn place_order<'a>(
        &'a self,
        _credential: &'a Credential,
        request: &'a OrderRequest,
    ) -> BoxFuture<'a, GatewayResult<OrderAck>> {
        Box::pin(async move {
            if self.take_forced_failure(&request.symbol, request.side) {
                return Err(GatewayError::Api {
                    code: "APBK0919".to_string(),
                    message: format!("mock rejected {} {}", request.side, request.symbol),
                });
            }
            let order_id = OrderId::new(Uuid::new_v4().simple().to_string());
            let price = self
                .prices
                .lock()
                .get(&request.symbol)
                .copied()
                .unwrap_or(Price::ZERO);
            let filled = if self.unfilled.lock().contains(&request.symbol) {
                Quantity::ZERO
            } else {
                request.quantity
            };
            self.orders.lock().push(request.clone());
            self.history.lock().push(OrderRecord {
                order_id: order_id.clone(),
                symbol: request.symbol.clone(),
                name: request.symbol.to_string(),
                side: request.side,
                ordered_qty: request.quantity,
                filled_qty: filled,
                avg_fill_price: if filled.is_zero() { Price::ZERO } else { price },
                ordered_at: None,
            });
            Ok(OrderAck {
                order_id,
                order_time: None,
                message: Some("mock order accepted".to_string()),
            })
        })
    }

    fn list_orders<'a>(
        &'a self,
        _credential: &'a Credential,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> BoxFuture<'a, GatewayResult<Vec<OrderRecord>>> {
        Box::pin(async move { Ok(self.history.lock().clone()) })
    }

    fn get_quota_usage<'a>(
        &'a self,
        _credential: &'a Credential,
    ) -> BoxFuture<'a, GatewayResult<QuotaUsage>> {
        Box::pin(async move {
            Ok(QuotaUsage::new(
                self.quota_used.load(Ordering::SeqCst),
                self.quota_limit.load(Ordering::SeqCst),
            ))
        })
    }
}

/// Mock historical price service.
#[derive(Debug, Default)]
pub struct MockMarketData {
    bars: Mutex<HashMap<Symbol, DailyBar>>,
    failing: Mutex<HashSet<Symbol>>,
    calls: AtomicUsize,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a prior close with a flat bar.
    pub fn set_close(&self, symbol: &Symbol, date: NaiveDate, close: Price, volume: u64) {
        self.bars.lock().insert(
            symbol.clone(),
            DailyBar {
                date,
                open: close,
                high: close,
                low: close,
                close,
                volume,
                traded_value: Decimal::from(volume) * close.inner(),
            },
        );
    }

    pub fn fail(&self, symbol: &Symbol) {
        self.failing.lock().insert(symbol.clone());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MarketDataProvider for MockMarketData {
    fn get_prior_close<'a>(
        &'a self,
        symbol: &'a Symbol,
        _date: NaiveDate,
    ) -> BoxFuture<'a, GatewayResult<DailyBar>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().contains(symbol) {
                return Err(GatewayError::HttpClient(format!("mock history failure for {symbol}")));
            }
            self.bars
                .lock()
                .get(symbol)
                .cloned()
                .ok_or_else(|| GatewayError::NoData(format!("no bar for {symbol}")))
        })
    }
}
