//! Korea Investment & Securities (KIS) open API client.
//!
//! Implements [`BrokerGateway`](crate::BrokerGateway) over the REST API and
//! [`MarketDataProvider`](crate::MarketDataProvider) over the daily item
//! chart endpoint.

mod auth;
mod chart;
mod client;
mod wire;

pub use auth::{TokenCacheFile, TokenManager};
pub use chart::KisDailyChart;
pub use client::KisGateway;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

const REAL_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
const VIRTUAL_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";

/// Live account or the broker's paper-trading ("virtual") environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Virtual,
    Real,
}

impl TradingMode {
    #[must_use]
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Real => REAL_BASE_URL,
            Self::Virtual => VIRTUAL_BASE_URL,
        }
    }

    /// Transaction id for a request: real ids start with `T`, virtual with `V`.
    fn tr_id(&self, suffix: &str) -> String {
        match self {
            Self::Real => format!("T{suffix}"),
            Self::Virtual => format!("V{suffix}"),
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::Virtual => write!(f, "virtual"),
        }
    }
}

/// Account number split into the 8-digit account and 2-digit product code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountNo {
    pub cano: String,
    pub product_code: String,
}

impl AccountNo {
    /// Accepts `XXXXXXXX-XX` or ten contiguous digits.
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let raw = raw.trim();
        let (cano, product_code) = match raw.split_once('-') {
            Some((a, b)) => (a, b),
            None if raw.len() == 10 => raw.split_at(8),
            None => {
                return Err(GatewayError::Config(format!(
                    "account number must be XXXXXXXX-XX or 10 digits, got {} chars",
                    raw.len()
                )))
            }
        };
        let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        if cano.len() != 8 || product_code.len() != 2 || !digits(cano) || !digits(product_code) {
            return Err(GatewayError::Config(
                "account number must be XXXXXXXX-XX or 10 digits".to_string(),
            ));
        }
        Ok(Self {
            cano: cano.to_string(),
            product_code: product_code.to_string(),
        })
    }
}

/// Connection settings for [`KisGateway`].
#[derive(Clone)]
pub struct KisConfig {
    pub mode: TradingMode,
    /// Overrides the mode's default base URL.
    pub base_url: Option<String>,
    pub app_key: String,
    pub app_secret: String,
    pub account: AccountNo,
    pub token_cache: Option<PathBuf>,
    pub http_timeout: Duration,
    /// Daily request allowance used when the broker reports none.
    pub daily_quota: u64,
    /// Exchange UTC offset used to timestamp quotes and orders.
    pub utc_offset_hours: i32,
}

impl fmt::Debug for KisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KisConfig")
            .field("mode", &self.mode)
            .field("base_url", &self.base_url)
            .field("app_key", &"<redacted>")
            .field("app_secret", &"<redacted>")
            .field("account", &self.account.cano)
            .field("token_cache", &self.token_cache)
            .field("http_timeout", &self.http_timeout)
            .field("daily_quota", &self.daily_quota)
            .finish()
    }
}

impl KisConfig {
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.mode.base_url())
    }

    /// Reject placeholder or missing credentials before any network call.
    pub fn validate(&self) -> GatewayResult<()> {
        let mut missing = Vec::new();
        if self.app_key.is_empty() || self.app_key == "DEFAULT_NOT_SET" {
            missing.push("KIS_APP_KEY");
        }
        if self.app_secret.is_empty() || self.app_secret == "DEFAULT_NOT_SET" {
            missing.push("KIS_APP_SECRET");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Auth(format!(
                "missing credentials: {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_no_formats() {
        let dashed = AccountNo::parse("12345678-01").unwrap();
        let plain = AccountNo::parse("1234567801").unwrap();
        assert_eq!(dashed, plain);
        assert_eq!(plain.cano, "12345678");
        assert_eq!(plain.product_code, "01");

        assert!(AccountNo::parse("1234-5678").is_err());
        assert!(AccountNo::parse("12345678").is_err());
        assert!(AccountNo::parse("1234567a-01").is_err());
    }

    #[test]
    fn test_tr_id_prefix_follows_mode() {
        assert_eq!(TradingMode::Real.tr_id("TTC0802U"), "TTTC0802U");
        assert_eq!(TradingMode::Virtual.tr_id("TTC0802U"), "VTTC0802U");
    }
}
