//! File persistence for the daybreak trading bot.
//!
//! - `BaselineCache`: same-day prior-close snapshot, invalidated on date rollover
//! - `ReportWriter`: end-of-day report and the day's selection as pretty JSON
//! - `TradeJournal`: one JSON Lines record per closed position
//! - `prune_older_than`: retention for dated files

pub mod cache;
pub mod error;
pub mod journal;
pub mod report;
pub mod retention;

pub use cache::{BaselineCache, CacheFile};
pub use error::{PersistenceError, PersistenceResult};
pub use journal::{JournalKind, TradeJournal, TradeRecord};
pub use report::{ReportWriter, SelectionRecord};
pub use retention::{date_in_name, prune_older_than};
