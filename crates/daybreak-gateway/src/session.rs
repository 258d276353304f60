//! Authenticated broker session.
//!
//! Created once at session init and handed to every later phase (and to the
//! position monitor task). Each call is bounded by the configured timeout so
//! a hung request can never stall the scheduler, and read calls go through
//! the shared [`FailureBackoff`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, NaiveDate};
use daybreak_core::{
    AccountBalance, Holding, LiveQuote, OrderAck, OrderRecord, OrderRequest, QuotaUsage, Symbol,
};
use daybreak_telemetry::Metrics;
use tracing::debug;

use crate::backoff::{BackoffPolicy, FailureBackoff};
use crate::broker::{Credential, DynBroker};
use crate::error::{GatewayError, GatewayResult};

/// Per-call limits applied by a [`Session`].
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub call_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Await `fut` for at most `after`, recording the outcome in metrics.
pub async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    let started = Instant::now();
    let result = match tokio::time::timeout(after, fut).await {
        Ok(inner) => inner,
        Err(_) => Err(GatewayError::Timeout { operation, after }),
    };
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    match &result {
        Ok(_) => Metrics::broker_call(operation, "ok", latency_ms),
        Err(e) => Metrics::broker_call(operation, e.outcome(), latency_ms),
    }
    result
}

#[derive(Clone)]
pub struct Session {
    broker: DynBroker,
    credential: Credential,
    call_timeout: Duration,
    backoff: Arc<FailureBackoff>,
    opened_at: DateTime<FixedOffset>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("credential", &self.credential)
            .field("call_timeout", &self.call_timeout)
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

impl Session {
    /// Authenticate against the broker and open a session.
    pub async fn open(
        broker: DynBroker,
        config: SessionConfig,
        opened_at: DateTime<FixedOffset>,
    ) -> GatewayResult<Self> {
        let credential =
            with_timeout("authenticate", config.call_timeout, broker.authenticate()).await?;
        Ok(Self {
            broker,
            credential,
            call_timeout: config.call_timeout,
            backoff: Arc::new(FailureBackoff::new(config.backoff)),
            opened_at,
        })
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    #[must_use]
    pub fn opened_at(&self) -> DateTime<FixedOffset> {
        self.opened_at
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    #[must_use]
    pub fn backoff(&self) -> &FailureBackoff {
        &self.backoff
    }

    /// Latest quote for `symbol`, subject to failure backoff.
    pub async fn quote(&self, symbol: &Symbol) -> GatewayResult<LiveQuote> {
        let key = format!("quote:{symbol}");
        if let Err(retry_in) = self.backoff.check(&key) {
            Metrics::broker_call_suppressed("quote");
            return Err(GatewayError::Backoff { key, retry_in });
        }
        let result = with_timeout(
            "quote",
            self.call_timeout,
            self.broker.get_quote(&self.credential, symbol),
        )
        .await;
        match &result {
            Ok(_) => self.backoff.record_success(&key),
            Err(e) => {
                let delay = self.backoff.record_failure(&key);
                debug!(symbol = %symbol, error = %e, backoff_ms = delay.as_millis() as u64, "Quote failed");
            }
        }
        result
    }

    pub async fn balance(&self) -> GatewayResult<AccountBalance> {
        with_timeout(
            "balance",
            self.call_timeout,
            self.broker.get_balance(&self.credential),
        )
        .await
    }

    pub async fn positions(&self) -> GatewayResult<Vec<Holding>> {
        with_timeout(
            "positions",
            self.call_timeout,
            self.broker.get_positions(&self.credential),
        )
        .await
    }

    /// Submit an order. Orders are never suppressed by backoff.
    pub async fn place_order(&self, request: &OrderRequest) -> GatewayResult<OrderAck> {
        let side = request.side.to_string();
        let result = with_timeout(
            "place_order",
            self.call_timeout,
            self.broker.place_order(&self.credential, request),
        )
        .await;
        match &result {
            Ok(_) => Metrics::order_accepted(&side),
            Err(_) => Metrics::order_rejected(&side),
        }
        result
    }

    pub async fn list_orders(&self, from: NaiveDate, to: NaiveDate) -> GatewayResult<Vec<OrderRecord>> {
        with_timeout(
            "list_orders",
            self.call_timeout,
            self.broker.list_orders(&self.credential, from, to),
        )
        .await
    }

    pub async fn quota_usage(&self) -> GatewayResult<QuotaUsage> {
        with_timeout(
            "quota_usage",
            self.call_timeout,
            self.broker.get_quota_usage(&self.credential),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBroker;
    use chrono::TimeZone;
    use daybreak_core::Price;
    use tokio_test::{assert_err, assert_ok};

    fn opened_at() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 19, 8, 29, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_fails_when_auth_rejected() {
        let broker = Arc::new(MockBroker::new());
        broker.set_auth_ok(false);
        let result = Session::open(broker, SessionConfig::default(), opened_at()).await;
        assert!(matches!(result, Err(GatewayError::Auth(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out() {
        let broker = Arc::new(MockBroker::new());
        broker.set_price(&Symbol::new("005930"), Price::from_krw(71_000));
        broker.set_quote_delay(Some(Duration::from_secs(60)));
        let config = SessionConfig {
            call_timeout: Duration::from_secs(2),
            backoff: BackoffPolicy::DISABLED,
        };
        let session = assert_ok!(Session::open(broker, config, opened_at()).await);

        let err = assert_err!(session.quote(&Symbol::new("005930")).await);
        assert!(matches!(err, GatewayError::Timeout { operation: "quote", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_quote_failures_are_suppressed() {
        let broker = Arc::new(MockBroker::new());
        let symbol = Symbol::new("000660");
        broker.fail_quotes(&symbol, true);
        let session = assert_ok!(
            Session::open(broker.clone(), SessionConfig::default(), opened_at()).await
        );

        assert_err!(session.quote(&symbol).await);
        let err = assert_err!(session.quote(&symbol).await);
        assert!(matches!(err, GatewayError::Backoff { .. }));
        assert_eq!(broker.quote_calls(), 1);

        broker.fail_quotes(&symbol, false);
        broker.set_price(&symbol, Price::from_krw(180_000));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_ok!(session.quote(&symbol).await);
        assert_eq!(session.backoff().consecutive_failures("quote:000660"), 0);
    }
}
