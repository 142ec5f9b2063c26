use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default capacity of the full per-session history log.
pub const HISTORY_CAPACITY: usize = 100;
/// How many entries are reported externally (snapshots, summaries).
pub const REPORTED_HISTORY: usize = 20;

/// One audit entry in a session's execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// The pipeline phase the entry was recorded in.
    pub phase: String,
    pub message: String,
    #[serde(default)]
    pub is_error: bool,
}

/// Bounded execution-history log.
///
/// A ring over `VecDeque`: pushing beyond capacity drops the oldest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    #[serde(default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize {
    HISTORY_CAPACITY
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when at capacity.
    pub fn push(&mut self, phase: &str, message: impl Into<String>, is_error: bool) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            timestamp: Utc::now(),
            phase: phase.to_string(),
            message: message.into(),
            is_error,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// The newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&HistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_recent() {
        let mut log = HistoryLog::new();
        log.push("planning", "started", false);
        log.push("planning", "plan ready", false);
        assert_eq!(log.len(), 2);

        let recent = log.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "plan ready");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut log = HistoryLog::with_capacity(3);
        for i in 0..5 {
            log.push("execution", format!("entry {i}"), false);
        }
        assert_eq!(log.len(), 3);
        let messages: Vec<&str> = log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn test_recent_more_than_len() {
        let mut log = HistoryLog::new();
        log.push("final", "done", false);
        assert_eq!(log.recent(REPORTED_HISTORY).len(), 1);
    }

    #[test]
    fn test_roundtrip_keeps_capacity() {
        let mut log = HistoryLog::with_capacity(2);
        log.push("routing", "a", false);
        let json = serde_json::to_string(&log).unwrap();
        let mut parsed: HistoryLog = serde_json::from_str(&json).unwrap();
        parsed.push("routing", "b", false);
        parsed.push("routing", "c", true);
        assert_eq!(parsed.len(), 2);
    }
}
