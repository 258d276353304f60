//! Daily report and selection files.
//!
//! `reports/YYYYMMDD_report.json` and `reports/YYYYMMDD_selection.json`,
//! written once per trading day as pretty JSON.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};
use daybreak_core::{DailyReport, ScoredCandidate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PersistenceResult;

/// The day's Phase 3 output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub date: NaiveDate,
    pub generated_at: DateTime<FixedOffset>,
    /// Number of filter survivors scored.
    pub evaluated: usize,
    pub selected: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn report_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}_report.json", date.format("%Y%m%d")))
    }

    #[must_use]
    pub fn selection_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}_selection.json", date.format("%Y%m%d")))
    }

    pub fn write_report(&self, report: &DailyReport) -> PersistenceResult<PathBuf> {
        let path = self.report_path(report.date);
        self.write_json(&path, report)?;
        info!(path = %path.display(), "Daily report written");
        Ok(path)
    }

    pub fn write_selection(&self, record: &SelectionRecord) -> PersistenceResult<PathBuf> {
        let path = self.selection_path(record.date);
        self.write_json(&path, record)?;
        info!(path = %path.display(), selected = record.selected.len(), "Selection written");
        Ok(path)
    }

    pub fn read_report(&self, date: NaiveDate) -> PersistenceResult<DailyReport> {
        let raw = fs::read_to_string(self.report_path(date))?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> PersistenceResult<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, serde_json::to_string_pretty(value)?)?;
        Ok(())
    }
}
