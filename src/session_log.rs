//! Session log
//!
//! Append-only record of every completed comparison in a session, in the order
//! the comparisons happened. Entries are never edited or removed; the log is
//! only emptied by replacing the whole session.

use crate::types::LogEntry;
use serde::{Deserialize, Serialize};

/// Column headers of the tabular export
pub const LOG_COLUMNS: [&str; 6] = [
    "Loop",
    "Stage Before",
    "RPI Before",
    "Stage After",
    "RPI After",
    "Status",
];

/// Ordered, append-only sequence of log entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionLog {
    entries: Vec<LogEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry at the end of the log
    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// All entries in insertion order
    pub fn all(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the log as a plain text table
    pub fn to_table(&self) -> String {
        let rows: Vec<[String; 6]> = self
            .entries
            .iter()
            .map(|e| {
                [
                    e.loop_number.to_string(),
                    e.stage_before.to_string(),
                    e.rpi_before.to_string(),
                    e.stage_after.to_string(),
                    e.rpi_after.to_string(),
                    e.status.label().to_string(),
                ]
            })
            .collect();

        let mut widths = LOG_COLUMNS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

        let mut out = String::new();
        push_row(&mut out, LOG_COLUMNS.iter().copied(), &widths);
        push_row(&mut out, rule.iter().map(String::as_str), &widths);
        for row in &rows {
            push_row(&mut out, row.iter().map(String::as_str), &widths);
        }
        out
    }

    /// Serialize the log entries to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Load log entries from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl<'a> IntoIterator for &'a SessionLog {
    type Item = &'a LogEntry;
    type IntoIter = std::slice::Iter<'a, LogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize; 6]) {
    let line: Vec<String> = cells
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}
