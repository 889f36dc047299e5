//! Completed-run history ring buffer
//!
//! Keeps the most recent completed benchmark runs for the historical-data
//! endpoint. Oldest entries are evicted first once the cap is reached.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use crate::dashboard::clock;
use crate::dashboard::types::StatsSummary;

const MAX_NAME_LEN: usize = 256;

/// Summary of one completed benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    pub total_requests: u64,
    pub error_count: u64,
    #[serde(default)]
    pub stats: BTreeMap<String, StatsSummary>,
    /// Stamped by [`HistoricalRecord::push`]
    #[serde(default)]
    pub completed_at: f64,
}

impl RunSummary {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            scenario: None,
            total_requests: 0,
            error_count: 0,
            stats: BTreeMap::new(),
            completed_at: 0.0,
        }
    }
}

/// Append-only, capped, oldest-first list of [`RunSummary`] records
pub struct HistoricalRecord {
    entries: RwLock<VecDeque<RunSummary>>,
    capacity: usize,
}

impl HistoricalRecord {
    /// Creates an empty record holding at most `capacity` runs
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Appends a run, evicting the oldest if at capacity.
    ///
    /// `completed_at` is stamped here and long names are truncated.
    pub fn push(&self, mut entry: RunSummary) {
        if self.capacity == 0 {
            return;
        }

        entry.completed_at = clock::now();
        truncate_on_char_boundary(&mut entry.run_name, MAX_NAME_LEN);
        if let Some(ref mut scenario) = entry.scenario {
            truncate_on_char_boundary(scenario, MAX_NAME_LEN);
        }

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Returns all entries in chronological order (oldest first)
    pub fn get_all(&self) -> Vec<RunSummary> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn truncate_on_char_boundary(value: &mut String, max_len: usize) {
    if value.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str) -> RunSummary {
        RunSummary {
            total_requests: 10,
            ..RunSummary::new(name)
        }
    }

    #[test]
    fn test_new_creates_empty_history() {
        let history = HistoricalRecord::new(10);
        assert_eq!(history.len(), 0);
        assert!(history.is_empty());
        assert!(history.get_all().is_empty());
    }

    #[test]
    fn test_push_stamps_completion_time() {
        let history = HistoricalRecord::new(10);
        history.push(run("run-1"));

        let entries = history.get_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].run_name, "run-1");
        assert!(entries[0].completed_at > 0.0);
    }

    #[test]
    fn test_ring_buffer_eviction_fifo() {
        let cap = 20;
        let history = HistoricalRecord::new(cap);

        for i in 0..cap + 5 {
            history.push(run(&format!("run-{}", i)));
        }

        assert_eq!(history.len(), cap);
        let names: Vec<String> = history.get_all().into_iter().map(|e| e.run_name).collect();
        let expected: Vec<String> = (5..cap + 5).map(|i| format!("run-{}", i)).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_get_all_returns_push_order() {
        let history = HistoricalRecord::new(10);
        for name in ["c", "a", "b"] {
            history.push(run(name));
        }

        let entries = history.get_all();
        assert_eq!(entries[0].run_name, "c");
        assert_eq!(entries[2].run_name, "b");
        assert!(entries[0].completed_at <= entries[2].completed_at);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let history = HistoricalRecord::new(0);
        history.push(run("ignored"));
        assert!(history.is_empty());
    }

    #[test]
    fn test_long_names_truncated_on_char_boundary() {
        let history = HistoricalRecord::new(1);
        history.push(run(&"é".repeat(200)));

        let name = &history.get_all()[0].run_name;
        assert!(name.len() <= MAX_NAME_LEN);
        assert!(name.chars().all(|c| c == 'é'));
    }
}
