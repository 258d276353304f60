//! Operator notifications.
//!
//! Every sink implements [`Notifier`], whose `notify` returns immediately:
//! delivery happens in the background and a failed delivery never reaches
//! the caller.

pub mod error;
pub mod message;
pub mod sink;
pub mod slack;

pub use error::{NotifyError, NotifyResult};
pub use message::{Notification, TradeAction, TradeEvent};
pub use sink::{FanoutNotifier, LogNotifier, Notifier, RecordingNotifier, SharedNotifier};
pub use slack::{SlackConfig, SlackNotifier};
