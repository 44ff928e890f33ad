//! Bounded observability log.
//!
//! The event log keeps the most recent entries produced by the engine so a
//! UI can render them. It is a sink only: nothing in the engine reads it back
//! to make a decision.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Default number of entries retained.
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 100;

/// Category of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    System,
    User,
    Push,
    Click,
    Refresh,
    Error,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::System => "SYSTEM",
            Self::User => "USER",
            Self::Push => "PUSH",
            Self::Click => "CLICK",
            Self::Refresh => "REFRESH",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A single immutable log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub category: LogCategory,
    pub payload: Value,
}

impl LogEntry {
    /// The `message` field of the payload, if any.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

/// Append-only FIFO of [`LogEntry`] with a fixed capacity.
///
/// Cloning is cheap and every clone shares the same buffer.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<Inner>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_LOG_CAPACITY)
    }

    /// A capacity of zero is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Append an entry, evicting the oldest one when full.
    pub fn append(&self, category: LogCategory, payload: Value) {
        mirror(category, &payload);

        let entry = LogEntry {
            timestamp: Utc::now(),
            category,
            payload,
        };

        let mut entries = self.inner.entries.lock();
        while entries.len() >= self.inner.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Shorthand for an entry whose payload is just `{"message": ...}`.
    pub fn message(&self, category: LogCategory, message: impl Into<String>) {
        self.append(
            category,
            serde_json::json!({ "message": message.into() }),
        );
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.inner.entries.lock().iter().cloned().collect()
    }

    /// Entries of one category, oldest first.
    pub fn entries_in(&self, category: LogCategory) -> Vec<LogEntry> {
        self.inner
            .entries
            .lock()
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }
}

/// Mirror an entry to tracing so it also reaches the console and log files.
fn mirror(category: LogCategory, payload: &Value) {
    match category {
        LogCategory::Error => warn!(category = %category, payload = %payload, "event"),
        LogCategory::Refresh | LogCategory::Click => {
            debug!(category = %category, payload = %payload, "event")
        }
        _ => info!(category = %category, payload = %payload, "event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_and_snapshot_order() {
        let log = EventLog::new();
        log.message(LogCategory::System, "first");
        log.message(LogCategory::User, "second");

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message(), Some("first"));
        assert_eq!(entries[1].category, LogCategory::User);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let log = EventLog::new();
        for i in 0..350 {
            log.append(LogCategory::System, json!({ "i": i }));
            assert!(log.len() <= DEFAULT_EVENT_LOG_CAPACITY);
        }
        assert_eq!(log.len(), DEFAULT_EVENT_LOG_CAPACITY);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let log = EventLog::with_capacity(3);
        for i in 0..5 {
            log.append(LogCategory::System, json!({ "i": i }));
        }
        let kept: Vec<i64> = log
            .snapshot()
            .iter()
            .map(|e| e.payload["i"].as_i64().unwrap())
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn test_clones_share_buffer() {
        let log = EventLog::with_capacity(10);
        let other = log.clone();
        other.message(LogCategory::Error, "boom");
        assert_eq!(log.entries_in(LogCategory::Error).len(), 1);
        log.clear();
        assert!(other.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_bumped() {
        let log = EventLog::with_capacity(0);
        log.message(LogCategory::System, "a");
        log.message(LogCategory::System, "b");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.snapshot()[0].message(), Some("b"));
    }
}
