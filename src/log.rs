//! Append-only, user-facing log of an import run.
//!
//! Every entry is also mirrored to `tracing` so library users with a
//! subscriber installed see the same stream.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

/// Default number of entries retained before the oldest are dropped.
pub const DEFAULT_LOG_LIMIT: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LogEntry {
    /// Monotonic sequence number, unaffected by dropping old entries.
    pub seq: u64,
    pub level: LogLevel,
    /// Time since the log was created or last cleared.
    pub elapsed: Duration,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>8.3}s] {:<5} {}",
            self.elapsed.as_secs_f64(),
            self.level,
            self.message
        )
    }
}

#[derive(Debug)]
pub struct ImportLog {
    entries: VecDeque<LogEntry>,
    limit: usize,
    started: Instant,
    next_seq: u64,
}

impl Default for ImportLog {
    fn default() -> Self {
        Self::with_limit(DEFAULT_LOG_LIMIT)
    }
}

impl ImportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
            started: Instant::now(),
            next_seq: 0,
        }
    }

    /// Drop every entry and restart the clock.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.started = Instant::now();
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!("{message}"),
            LogLevel::Info => info!("{message}"),
            LogLevel::Warning => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }

        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            seq: self.next_seq,
            level,
            elapsed: self.started.elapsed(),
            message,
        });
        self.next_seq += 1;
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Retained entries with a sequence number of at least `seq`.
    pub fn entries_since(&self, seq: u64) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.seq >= seq)
    }

    /// Sequence number the next entry will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order_and_levels() {
        let mut log = ImportLog::new();
        log.info("first");
        log.warn("second");
        log.error("third");
        let messages: Vec<_> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
        assert_eq!(log.count(LogLevel::Warning), 1);
        assert!(log.contains("thi"));
    }

    #[test]
    fn drops_oldest_past_limit() {
        let mut log = ImportLog::with_limit(2);
        log.info("a");
        log.info("b");
        log.info("c");
        let messages: Vec<_> = log.entries().map(|e| e.message.clone()).collect();
        assert_eq!(messages, ["b", "c"]);
        assert_eq!(log.entries().next().map(|e| e.seq), Some(1));
    }

    #[test]
    fn entries_since_tracks_sequence() {
        let mut log = ImportLog::new();
        log.info("a");
        let mark = log.next_seq();
        log.info("b");
        log.info("c");
        assert_eq!(log.entries_since(mark).count(), 2);
    }

    #[test]
    fn clear_empties() {
        let mut log = ImportLog::new();
        log.debug("x");
        log.clear();
        assert!(log.is_empty());
    }
}
