//! Append-only record of applied transitions

use super::types::{AppState, Transition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub from: AppState,
    pub to: AppState,
    pub transition: Transition,
}

impl HistoryEntry {
    pub fn new(from: AppState, to: AppState, transition: Transition) -> Self {
        Self {
            timestamp: Utc::now(),
            from,
            to,
            transition,
        }
    }
}

/// Entries are only ever pushed; nothing is rewritten or dropped.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
