use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use super::state::State;

/// Default number of entries kept per session.
pub const DEFAULT_LOG_CAPACITY: usize = 30;

/// One line of a session's action log, as pushed to the status sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub state: State,
    pub is_error: bool,
    pub is_state_change: bool,
}

/// Bounded, time-ordered log of what a session did.
///
/// Appends are safe from both engine loops. After every append the current
/// snapshot is handed to the reporter feed, so the sink never runs under
/// the engine's locks.
pub struct ActionLog {
    instance_id: u32,
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
    feed: Mutex<Option<mpsc::UnboundedSender<Vec<LogEntry>>>>,
}

impl ActionLog {
    pub fn new(instance_id: u32, capacity: usize) -> Self {
        Self {
            instance_id,
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            feed: Mutex::new(None),
        }
    }

    /// Attach the reporter feed; returns the receiving half.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<LogEntry>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.feed) = Some(tx);
        rx
    }

    /// Detach the feed so the reporter drains and exits.
    pub fn close_feed(&self) {
        lock(&self.feed).take();
    }

    pub fn record(&self, state: State, message: impl Into<String>, is_error: bool, is_state_change: bool) {
        let entry = LogEntry {
            timestamp: Local::now(),
            message: message.into(),
            state,
            is_error,
            is_state_change,
        };

        if is_error {
            error!(instance = self.instance_id, state = %state, "{}", entry.message);
        } else {
            info!(instance = self.instance_id, state = %state, "{}", entry.message);
        }

        let mut entries = lock(&self.entries);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);

        // Sent under the entries guard so snapshots reach the feed in the
        // order they were taken. The send never blocks.
        if let Some(tx) = lock(&self.feed).as_ref() {
            // A closed receiver only means nobody is reporting any more.
            let _ = tx.send(entries.iter().cloned().collect());
        }
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        lock(&self.entries).iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panic while holding one of these locks leaves plain data behind.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
