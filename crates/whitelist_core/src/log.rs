//! Per-connection event log.
//!
//! Each managed connection keeps a bounded history of lifecycle events. The
//! status classifier reads it to decide whether a server is unreachable, and
//! operators read it for diagnostics. Entries are also forwarded to `tracing`
//! so that long-term retention is the subscriber's job, not ours.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// A single recorded event.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub message: String,
    pub level: LogLevel,
    /// Wall-clock time, for display.
    pub timestamp: DateTime<Utc>,
    /// Monotonic time, for age comparisons.
    pub recorded_at: Instant,
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        self.level == LogLevel::Error
    }
}

/// Bounded, append-only log. Oldest entries are evicted once `capacity` is
/// reached.
#[derive(Debug)]
pub struct EventLog {
    server_id: String,
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl EventLog {
    pub fn new(server_id: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            server_id: server_id.into(),
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    pub fn push(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => info!(server = %self.server_id, "{}", message),
            LogLevel::Warning => warn!(server = %self.server_id, "{}", message),
            LogLevel::Error => error!(server = %self.server_id, "{}", message),
        }

        let entry = LogEntry {
            message,
            level,
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        };

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Newest entry, if any.
    pub fn last(&self) -> Option<LogEntry> {
        self.entries.lock().back().cloned()
    }

    /// Newest entry with the given level.
    pub fn last_of(&self, level: LogLevel) -> Option<LogEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|entry| entry.level == level)
            .cloned()
    }

    /// Snapshot of all retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
