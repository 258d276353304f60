//! Date-based retention for log, journal and report directories.

use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::error::PersistenceResult;

/// First date embedded in a file name, as `YYYY-MM-DD` or `YYYYMMDD`.
#[must_use]
pub fn date_in_name(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    for start in 0..bytes.len() {
        if !bytes[start].is_ascii_digit() || (start > 0 && bytes[start - 1].is_ascii_digit()) {
            continue;
        }
        if let Some(dashed) = name.get(start..start + 10) {
            if let Ok(date) = NaiveDate::parse_from_str(dashed, "%Y-%m-%d") {
                return Some(date);
            }
        }
        if let Some(compact) = name.get(start..start + 8) {
            let next_is_digit = bytes.get(start + 8).is_some_and(u8::is_ascii_digit);
            if compact.bytes().all(|b| b.is_ascii_digit()) && !next_is_digit {
                if let Ok(date) = NaiveDate::parse_from_str(compact, "%Y%m%d") {
                    return Some(date);
                }
            }
        }
    }
    None
}

/// Delete files in `dir` whose embedded date is more than `days` before
/// `today`. Files without a date are left alone. Returns the number removed.
pub fn prune_older_than(dir: &Path, days: u32, today: NaiveDate) -> PersistenceResult<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let cutoff = today - Duration::days(i64::from(days));
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(date) = name.to_str().and_then(date_in_name) else {
            continue;
        };
        if date >= cutoff {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(file = %entry.path().display(), %date, "Removed expired file");
                removed += 1;
            }
            Err(e) => warn!(file = %entry.path().display(), error = %e, "Failed to remove expired file"),
        }
    }
    if removed > 0 {
        info!(dir = %dir.display(), removed, retention_days = days, "Pruned expired files");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_in_name() {
        assert_eq!(date_in_name("trades_2026-10-19.jsonl"), Some(d(2026, 10, 19)));
        assert_eq!(date_in_name("20261019_report.json"), Some(d(2026, 10, 19)));
        assert_eq!(date_in_name("daybreak.log.2026-09-01"), Some(d(2026, 9, 1)));
        assert_eq!(date_in_name("baseline_cache.json"), None);
        assert_eq!(date_in_name("order_1234567890.json"), None);
    }

    #[test]
    fn test_prune_keeps_recent_and_undated() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "20260901_report.json",
            "20261010_report.json",
            "trades_2026-09-18.jsonl",
            "trades_2026-09-19.jsonl",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }

        let removed = prune_older_than(dir.path(), 30, d(2026, 10, 19)).unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().join("20261010_report.json").exists());
        assert!(dir.path().join("trades_2026-09-19.jsonl").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir.path().join("20260901_report.json").exists());
    }

    #[test]
    fn test_prune_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(prune_older_than(&dir.path().join("nope"), 30, d(2026, 10, 19)).unwrap(), 0);
    }
}
