//! Application configuration.
//!
//! Loaded from a TOML file and overlaid with `DAYBREAK__SECTION__KEY`
//! environment variables. Broker credentials only ever come from the
//! environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use daybreak_core::{FixedHolidays, Instrument, NoHolidays, Timetable, TradingCalendar};
use daybreak_gateway::{AccountNo, BackoffPolicy, KisConfig, SessionConfig, TradingMode};
use daybreak_notify::SlackConfig;
use daybreak_position::ExitConfig;
use daybreak_strategy::{FilterConfig, ScoringConfig};
use daybreak_telemetry::LoggingConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DAYBREAK_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Phase boundaries (`HH:MM`, exchange-local) and loop intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimetableConfig {
    pub reset: String,
    pub wake: String,
    pub baseline: String,
    pub monitoring: String,
    pub selection: String,
    pub buy: String,
    pub manage: String,
    pub close: String,
    pub sleep: String,
    /// Exchange offset from UTC in hours (KST = 9).
    pub utc_offset_hours: i32,
    /// Outer scheduling loop period.
    pub tick_secs: u64,
    /// Pause after a failed tick.
    pub cooldown_secs: u64,
    /// Position monitor poll period.
    pub monitor_interval_secs: u64,
    /// Market holidays excluded on top of weekends.
    pub holidays: Vec<NaiveDate>,
}

impl Default for TimetableConfig {
    fn default() -> Self {
        Self {
            reset: "08:28".to_string(),
            wake: "08:29".to_string(),
            baseline: "08:30".to_string(),
            monitoring: "08:35".to_string(),
            selection: "08:58".to_string(),
            buy: "08:59".to_string(),
            manage: "09:00".to_string(),
            close: "09:59".to_string(),
            sleep: "10:00".to_string(),
            utc_offset_hours: 9,
            tick_secs: 30,
            cooldown_secs: 60,
            monitor_interval_secs: 5,
            holidays: Vec::new(),
        }
    }
}

fn parse_hm(field: &str, raw: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| AppError::Config(format!("timetable.{field} = {raw:?}: {e}")))
}

impl TimetableConfig {
    pub fn calendar(&self) -> TradingCalendar {
        if self.holidays.is_empty() {
            TradingCalendar::new(Arc::new(NoHolidays))
        } else {
            TradingCalendar::new(Arc::new(FixedHolidays::new(self.holidays.iter().copied())))
        }
    }

    pub fn build(&self) -> AppResult<Timetable> {
        let starts = [
            parse_hm("reset", &self.reset)?,
            parse_hm("wake", &self.wake)?,
            parse_hm("baseline", &self.baseline)?,
            parse_hm("monitoring", &self.monitoring)?,
            parse_hm("selection", &self.selection)?,
            parse_hm("buy", &self.buy)?,
            parse_hm("manage", &self.manage)?,
            parse_hm("close", &self.close)?,
        ];
        let sleep = parse_hm("sleep", &self.sleep)?;
        Ok(Timetable::new(starts, sleep, self.calendar())?)
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

/// Broker connection settings. Credentials are read from `KIS_APP_KEY`,
/// `KIS_APP_SECRET` and `KIS_ACCOUNT_NO`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: Option<String>,
    pub call_timeout_secs: u64,
    pub token_cache: Option<PathBuf>,
    pub daily_quota: u64,
    /// Quota usage (percent) that triggers a warning.
    pub quota_warn_pct: f64,
    /// First suppression after a failed quote; 0 disables backoff.
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            call_timeout_secs: 10,
            token_cache: Some(PathBuf::from("cache/kis_token.json")),
            daily_quota: 20_000,
            quota_warn_pct: 80.0,
            backoff_base_secs: 5,
            backoff_cap_secs: 60,
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            call_timeout: self.call_timeout(),
            backoff: if self.backoff_base_secs == 0 {
                BackoffPolicy::DISABLED
            } else {
                BackoffPolicy {
                    base: Duration::from_secs(self.backoff_base_secs),
                    cap: Duration::from_secs(self.backoff_cap_secs.max(self.backoff_base_secs)),
                }
            },
        }
    }

    /// REST client settings with credentials from the environment.
    pub fn kis_config(&self, mode: TradingMode, utc_offset_hours: i32) -> AppResult<KisConfig> {
        let env = |name: &str| std::env::var(name).unwrap_or_default();
        let account_raw = env("KIS_ACCOUNT_NO");
        if account_raw.is_empty() {
            return Err(AppError::Config("KIS_ACCOUNT_NO is not set".to_string()));
        }
        Ok(KisConfig {
            mode,
            base_url: self.base_url.clone(),
            app_key: env("KIS_APP_KEY"),
            app_secret: env("KIS_APP_SECRET"),
            account: AccountNo::parse(&account_raw)?,
            token_cache: self.token_cache.clone(),
            http_timeout: self.call_timeout(),
            daily_quota: self.daily_quota,
            utc_offset_hours,
        })
    }
}

/// Output directories and retention.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub cache_dir: PathBuf,
    pub report_dir: PathBuf,
    pub journal_dir: PathBuf,
    /// Rolling log directory, pruned alongside reports and journals.
    pub log_dir: Option<PathBuf>,
    pub retention_days: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            report_dir: PathBuf::from("reports"),
            journal_dir: PathBuf::from("journal"),
            log_dir: Some(PathBuf::from("logs")),
            retention_days: 30,
        }
    }
}

impl PersistenceConfig {
    /// Directories subject to retention pruning.
    #[must_use]
    pub fn prunable_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.report_dir.clone(), self.journal_dir.clone()];
        dirs.extend(self.log_dir.clone());
        dirs
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Sell every open position when the process is interrupted.
    pub liquidate_on_interrupt: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: TradingMode,
    pub timetable: TimetableConfig,
    pub universe: Vec<Instrument>,
    pub filter: FilterConfig,
    pub scoring: ScoringConfig,
    pub exits: ExitConfig,
    pub broker: BrokerConfig,
    pub persistence: PersistenceConfig,
    pub notify: SlackConfig,
    pub logging: LoggingConfig,
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// Resolve the config path: explicit > `DAYBREAK_CONFIG` > default.
    #[must_use]
    pub fn resolve_path(explicit: Option<String>) -> PathBuf {
        explicit
            .or_else(|| std::env::var(CONFIG_ENV).ok())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load `path`, overlay the environment and validate.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
        }
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("DAYBREAK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without environment overlay.
    pub fn from_toml_str(raw: &str) -> AppResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.timetable.build()?;
        if self.timetable.tick_secs == 0
            || self.timetable.cooldown_secs == 0
            || self.timetable.monitor_interval_secs == 0
        {
            return Err(AppError::Config(
                "timetable intervals must be greater than zero".to_string(),
            ));
        }
        if self.universe.is_empty() {
            return Err(AppError::Config("universe must not be empty".to_string()));
        }
        self.filter.validate()?;
        self.scoring.validate()?;
        self.exits.validate()?;
        if self.broker.call_timeout_secs == 0 {
            return Err(AppError::Config(
                "broker.call_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
