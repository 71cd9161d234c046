//! Observable event log.
//!
//! Every error and notable transition the session goes through is recorded
//! here with a severity tag, independently of whatever logging sink the
//! driver installs.

use std::{collections::VecDeque, fmt};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal lifecycle events.
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures that block the session.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(tag)
    }
}

/// One recorded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Severity tag.
    pub level: LogLevel,
    /// Human-readable description.
    pub message: String,
}

/// Bounded ring buffer of [`LogEntry`]. Oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EventLog {
    /// Empty log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity.min(64)), capacity }
    }

    /// Append an entry, evicting the oldest if full.
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry { level, message: message.into() });
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Entries at or above `level`.
    pub fn at_least(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |entry| entry.level >= level)
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut log = EventLog::new(2);
        log.push(LogLevel::Info, "one");
        log.push(LogLevel::Warn, "two");
        log.push(LogLevel::Error, "three");

        let messages: Vec<_> = log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["two", "three"]);
    }

    #[test]
    fn filters_by_severity() {
        let mut log = EventLog::new(8);
        log.push(LogLevel::Debug, "noise");
        log.push(LogLevel::Warn, "peer unreachable");
        log.push(LogLevel::Error, "directory unavailable");

        assert_eq!(log.at_least(LogLevel::Warn).count(), 2);
        assert_eq!(log.last().map(|e| e.level), Some(LogLevel::Error));
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let mut log = EventLog::new(0);
        log.push(LogLevel::Info, "a");
        log.push(LogLevel::Info, "b");
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().map(|e| e.message.as_str()), Some("b"));
    }
}
