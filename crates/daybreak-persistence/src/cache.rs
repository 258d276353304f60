//! Same-day baseline cache.
//!
//! Lets a restart within the trading day skip the prior-close fetch. The
//! file is keyed by calendar date and ignored once the date rolls over.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};
use daybreak_core::{BaselineSnapshot, Symbol};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, PersistenceResult};

/// On-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    pub cache_date: NaiveDate,
    /// Local capture time, `HH:MM:SS`.
    pub cache_time: String,
    pub data: BTreeMap<Symbol, BaselineSnapshot>,
}

#[derive(Debug, Clone)]
pub struct BaselineCache {
    path: PathBuf,
}

impl BaselineCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/baseline_cache.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join("baseline_cache.json"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Today's snapshots, or `None` if there is no cache for `today`.
    ///
    /// An unreadable file is treated as a miss.
    pub fn load(&self, today: NaiveDate) -> Option<Vec<BaselineSnapshot>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No baseline cache");
            return None;
        }
        let file: CacheFile = match fs::read_to_string(&self.path)
            .map_err(PersistenceError::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(PersistenceError::from))
        {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable baseline cache");
                return None;
            }
        };
        if file.cache_date != today {
            info!(cache_date = %file.cache_date, %today, "Baseline cache is stale");
            return None;
        }
        if file.data.is_empty() {
            return None;
        }
        info!(
            count = file.data.len(),
            cache_time = %file.cache_time,
            "Loaded baseline cache"
        );
        Some(file.data.into_values().collect())
    }

    /// Persist today's snapshots. Refuses an empty set.
    pub fn save(
        &self,
        today: NaiveDate,
        at: DateTime<FixedOffset>,
        snapshots: &[BaselineSnapshot],
    ) -> PersistenceResult<()> {
        if snapshots.is_empty() {
            return Err(PersistenceError::Empty("baseline cache".to_string()));
        }
        let file = CacheFile {
            cache_date: today,
            cache_time: at.format("%H:%M:%S").to_string(),
            data: snapshots
                .iter()
                .map(|s| (s.symbol.clone(), s.clone()))
                .collect(),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Atomic replace.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
        fs::rename(&tmp, &self.path)?;
        info!(path = %self.path.display(), count = snapshots.len(), "Saved baseline cache");
        Ok(())
    }
}
