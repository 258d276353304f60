//! Access token lifecycle.
//!
//! Tokens are issued by `POST /oauth2/tokenP`, treated as expiring one hour
//! before the broker says they do, and refreshed once they are within ten
//! minutes of that. The last token is cached to a JSON file so restarts
//! within the day do not burn a fresh issue (the broker rate-limits them).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{KisConfig, TradingMode};
use crate::broker::Credential;
use crate::error::{GatewayError, GatewayResult};

const TOKEN_PATH: &str = "/oauth2/tokenP";
const DEFAULT_EXPIRES_IN_SECS: i64 = 86_400;
const EXPIRY_SAFETY_SECS: i64 = 3_600;

fn refresh_margin() -> Duration {
    Duration::minutes(10)
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    appkey: &'a str,
    appsecret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// On-disk token cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCacheFile {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub real: bool,
    pub saved_at: DateTime<Utc>,
}

impl TokenCacheFile {
    pub fn load(path: &Path) -> GatewayResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, path: &Path) -> GatewayResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The cached credential, if it belongs to `mode` and is still usable.
    #[must_use]
    pub fn usable_credential(&self, mode: TradingMode, now: DateTime<Utc>) -> Option<Credential> {
        if self.real != (mode == TradingMode::Real) {
            return None;
        }
        let credential = Credential {
            access_token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at,
        };
        credential
            .is_valid_at(now, refresh_margin())
            .then_some(credential)
    }
}

/// Issues, caches and refreshes access tokens.
pub struct TokenManager {
    client: Client,
    token_url: String,
    app_key: String,
    app_secret: String,
    mode: TradingMode,
    cache_path: Option<PathBuf>,
    current: tokio::sync::Mutex<Option<Credential>>,
}

impl TokenManager {
    pub fn new(client: Client, config: &KisConfig) -> Self {
        Self {
            client,
            token_url: format!("{}{}", config.base_url(), TOKEN_PATH),
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            mode: config.mode,
            cache_path: config.token_cache.clone(),
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// A valid credential: in-memory, then file cache, then a fresh issue.
    ///
    /// Concurrent callers wait on the same lock so only one issue is in flight.
    pub async fn credential(&self) -> GatewayResult<Credential> {
        let mut current = self.current.lock().await;
        let now = Utc::now();

        if let Some(credential) = current.as_ref() {
            if credential.is_valid_at(now, refresh_margin()) {
                return Ok(credential.clone());
            }
        }

        if let Some(credential) = self.load_cached(now) {
            info!(expires_at = %credential.expires_at, "Using cached access token");
            *current = Some(credential.clone());
            return Ok(credential);
        }

        info!(mode = %self.mode, "Issuing new access token");
        let credential = self.issue(now).await?;
        self.save_cached(&credential, now);
        *current = Some(credential.clone());
        Ok(credential)
    }

    fn load_cached(&self, now: DateTime<Utc>) -> Option<Credential> {
        let path = self.cache_path.as_ref()?;
        match TokenCacheFile::load(path) {
            Ok(Some(file)) => file.usable_credential(self.mode, now),
            Ok(None) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read token cache");
                None
            }
        }
    }

    fn save_cached(&self, credential: &Credential, now: DateTime<Utc>) {
        let Some(path) = self.cache_path.as_ref() else {
            return;
        };
        let file = TokenCacheFile {
            access_token: credential.access_token.clone(),
            token_type: credential.token_type.clone(),
            expires_at: credential.expires_at,
            real: self.mode == TradingMode::Real,
            saved_at: now,
        };
        if let Err(e) = file.save(path) {
            warn!(path = %path.display(), error = %e, "Failed to write token cache");
        }
    }

    async fn issue(&self, now: DateTime<Utc>) -> GatewayResult<Credential> {
        let request = TokenRequest {
            grant_type: "client_credentials",
            appkey: &self.app_key,
            appsecret: &self.app_secret,
        };

        let response = self
            .client
            .post(&self.token_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::HttpClient(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!("HTTP {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("token response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(GatewayError::Auth("empty access token".to_string()));
        }

        let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Ok(Credential {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_at: now + Duration::seconds(expires_in - EXPIRY_SAFETY_SECS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cache(real: bool, expires_at: DateTime<Utc>) -> TokenCacheFile {
        TokenCacheFile {
            access_token: "cached".to_string(),
            token_type: "Bearer".to_string(),
            expires_at,
            real,
            saved_at: expires_at - Duration::hours(23),
        }
    }

    #[test]
    fn test_cache_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens").join("kis_token.json");
        let expires = Utc.with_ymd_and_hms(2026, 10, 20, 7, 0, 0).unwrap();

        assert!(TokenCacheFile::load(&path).unwrap().is_none());
        cache(false, expires).save(&path).unwrap();
        let loaded = TokenCacheFile::load(&path).unwrap().unwrap();
        assert_eq!(loaded.access_token, "cached");
        assert_eq!(loaded.expires_at, expires);
    }

    #[test]
    fn test_cached_token_rejected_for_other_mode() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 23, 0, 0).unwrap();
        let file = cache(true, now + Duration::hours(5));
        assert!(file.usable_credential(TradingMode::Real, now).is_some());
        assert!(file.usable_credential(TradingMode::Virtual, now).is_none());
    }

    #[test]
    fn test_cached_token_rejected_near_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 23, 0, 0).unwrap();
        let file = cache(false, now + Duration::minutes(9));
        assert!(file.usable_credential(TradingMode::Virtual, now).is_none());
    }
}
