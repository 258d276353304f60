//! Capability traits for the brokerage and the historical price service.
//!
//! Both traits return boxed futures so they stay dyn-compatible and can be
//! shared as `Arc<dyn ...>` between the phase engine and the position
//! monitor task.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use daybreak_core::{
    AccountBalance, DailyBar, Holding, LiveQuote, OrderAck, OrderRecord, OrderRequest, QuotaUsage,
    Symbol,
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Access token issued by the broker.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Usable at `now` if it does not expire within `refresh_margin`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, refresh_margin: Duration) -> bool {
        !self.access_token.is_empty() && now < self.expires_at - refresh_margin
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Brokerage capability consumed by the phase engine.
///
/// Every call after `authenticate` takes the credential explicitly; the
/// gateway holds no ambient session.
pub trait BrokerGateway: Send + Sync {
    fn authenticate(&self) -> BoxFuture<'_, GatewayResult<Credential>>;

    fn get_quote<'a>(
        &'a self,
        credential: &'a Credential,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, GatewayResult<LiveQuote>>;

    fn get_balance<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BoxFuture<'a, GatewayResult<AccountBalance>>;

    fn get_positions<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BoxFuture<'a, GatewayResult<Vec<Holding>>>;

    fn place_order<'a>(
        &'a self,
        credential: &'a Credential,
        request: &'a OrderRequest,
    ) -> BoxFuture<'a, GatewayResult<OrderAck>>;

    fn list_orders<'a>(
        &'a self,
        credential: &'a Credential,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxFuture<'a, GatewayResult<Vec<OrderRecord>>>;

    fn get_quota_usage<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BoxFuture<'a, GatewayResult<QuotaUsage>>;
}

/// Historical daily price capability.
pub trait MarketDataProvider: Send + Sync {
    /// Daily bar for `symbol` on `date`, or the latest bar before it.
    fn get_prior_close<'a>(
        &'a self,
        symbol: &'a Symbol,
        date: NaiveDate,
    ) -> BoxFuture<'a, GatewayResult<DailyBar>>;
}

/// Arc wrapper for broker trait objects.
pub type DynBroker = Arc<dyn BrokerGateway>;

/// Arc wrapper for market data trait objects.
pub type DynMarketData = Arc<dyn MarketDataProvider>;
