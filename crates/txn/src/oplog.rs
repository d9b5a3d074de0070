//! Per-attempt operation log
//!
//! Every public context operation appends one entry. The log travels with
//! `TransactionFailed` so callers can print what the attempt did before it
//! died, without the engine needing a logger to be installed.

use std::fmt;

use chrono::{DateTime, Utc};

/// One logged operation.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// When the operation happened.
    pub at: DateTime<Utc>,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.at.format("%H:%M:%S%.3f"), self.message)
    }
}

/// Ordered log of what a transaction attempt did.
#[derive(Debug, Clone, Default)]
pub struct OpLog {
    entries: Vec<LogEntry>,
}

impl OpLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a timestamped entry.
    pub fn push(&mut self, message: impl Into<String>) {
        self.entries.push(LogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    /// The entries, oldest first.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Move the entries out, leaving the log empty.
    pub fn take(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_preserves_order() {
        let mut log = OpLog::new();
        log.push("get conference");
        log.push("replace conference");
        let messages: Vec<_> = log.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["get conference", "replace conference"]);
    }

    #[test]
    fn take_empties_the_log() {
        let mut log = OpLog::new();
        log.push("one");
        let taken = log.take();
        assert_eq!(taken.len(), 1);
        assert!(log.entries().is_empty());
    }

    #[test]
    fn display_includes_message() {
        let mut log = OpLog::new();
        log.push("commit decided");
        let line = log.entries()[0].to_string();
        assert!(line.ends_with("commit decided"));
    }
}
