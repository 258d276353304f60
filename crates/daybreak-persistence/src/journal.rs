//! JSON Lines trade journal.
//!
//! One file per trading day (`trades_YYYY-MM-DD.jsonl`), one record per
//! closed position. Opened in append mode and flushed after every record,
//! so a restart within the day keeps extending the same file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};
use daybreak_core::{ExitKind, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PersistenceResult;

/// How the position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    /// Threshold exit by the position monitor.
    MonitorExit,
    /// Session-close sweep.
    Liquidation,
}

/// One closed position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub recorded_at: DateTime<FixedOffset>,
    pub symbol: Symbol,
    pub name: String,
    pub kind: JournalKind,
    pub reason: ExitKind,
    pub quantity: u64,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub buy_amount: Decimal,
    pub sell_amount: Decimal,
    pub return_pct: Decimal,
    pub profit: Decimal,
}

struct ActiveWriter {
    writer: BufWriter<File>,
    date: NaiveDate,
    records_written: usize,
}

pub struct TradeJournal {
    dir: PathBuf,
    active: Option<ActiveWriter>,
}

impl TradeJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(?e, dir = %dir.display(), "Failed to create journal directory");
        }
        Self { dir, active: None }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("trades_{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Append one record to the file for its date.
    pub fn append(&mut self, record: &TradeRecord) -> PersistenceResult<()> {
        let date = record.recorded_at.date_naive();
        if self.active.as_ref().is_some_and(|w| w.date != date) {
            self.close();
        }
        let active = match self.active.as_mut() {
            Some(active) => active,
            None => {
                let path = self.path_for(date);
                fs::create_dir_all(&self.dir)?;
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                info!(path = %path.display(), "Opened trade journal (append mode)");
                self.active.insert(ActiveWriter {
                    writer: BufWriter::new(file),
                    date,
                    records_written: 0,
                })
            }
        };

        writeln!(active.writer, "{}", serde_json::to_string(record)?)?;
        active.writer.flush()?;
        active.records_written += 1;
        debug!(symbol = %record.symbol, reason = %record.reason, "Trade journaled");
        Ok(())
    }

    /// Every record for `date`. Unparseable lines are skipped.
    pub fn read_day(&self, date: NaiveDate) -> PersistenceResult<Vec<TradeRecord>> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path)?;
        Ok(raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupt journal line");
                    None
                }
            })
            .collect())
    }

    pub fn close(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush journal on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed trade journal"
            );
        }
    }
}

impl Drop for TradeJournal {
    fn drop(&mut self) {
        self.close();
    }
}
