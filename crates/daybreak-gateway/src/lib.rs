//! Broker gateway and market data capabilities.
//!
//! - `BrokerGateway`, `MarketDataProvider`: dyn-compatible capability traits
//! - `Session`: authenticated context created at session init and threaded
//!   through every phase; applies per-call timeouts and failure backoff
//! - `kis`: REST client for the Korea Investment & Securities open API
//! - `mock`: scriptable in-memory implementations for tests

pub mod backoff;
pub mod broker;
pub mod error;
pub mod kis;
pub mod mock;
pub mod session;

pub use backoff::{BackoffPolicy, FailureBackoff};
pub use broker::{
    BoxFuture, BrokerGateway, Credential, DynBroker, DynMarketData, MarketDataProvider,
};
pub use error::{GatewayError, GatewayResult};
pub use kis::{AccountNo, KisConfig, KisDailyChart, KisGateway, TradingMode};
pub use session::{with_timeout, Session, SessionConfig};
