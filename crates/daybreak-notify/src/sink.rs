//! Notification sink trait and the in-process sinks.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::message::Notification;

/// One-way consumer of notifications.
///
/// `notify` must return without waiting on delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Writes every notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        let text = notification.render();
        if notification.is_failure() {
            warn!(target: "daybreak::notify", "{text}");
        } else {
            info!(target: "daybreak::notify", "{text}");
        }
    }
}

/// Forwards to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<SharedNotifier>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: SharedNotifier) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, notification: Notification) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.notify(notification.clone());
            }
            last.notify(notification);
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }

    /// Rendered text of every notification received so far.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.received.lock().iter().map(Notification::render).collect()
    }

    #[must_use]
    pub fn count_matching(&self, pred: impl Fn(&Notification) -> bool) -> usize {
        self.received.lock().iter().filter(|n| pred(n)).count()
    }

    pub fn clear(&self) {
        self.received.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.received.lock().push(notification);
    }
}
