//! Execution result types.
//!
//! Bitstring ordering: the rightmost bit is classical bit 0 (OpenQASM 3
//! convention). For the calculator's `ans` register of width `n + 1` the
//! leftmost character is therefore the carry-out and the remaining `n`
//! characters are the sum, most significant first.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Measurement counts from program execution.
///
/// Maps bitstrings to occurrence counts. Entries keep the order in which
/// bitstrings were first observed, so equal counts rank deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(String, u64)>", into = "Vec<(String, u64)>")]
pub struct Counts {
    entries: Vec<(String, u64)>,
    index: FxHashMap<String, usize>,
}

impl Counts {
    /// Create empty counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create counts from an iterator of (bitstring, count) pairs.
    /// Duplicate bitstrings are accumulated (summed), consistent with `insert()`.
    pub fn from_pairs(iter: impl IntoIterator<Item = (impl Into<String>, u64)>) -> Self {
        let mut counts = Self::new();
        for (k, v) in iter {
            counts.insert(k, v);
        }
        counts
    }

    /// Insert a count for a bitstring.
    pub fn insert(&mut self, bitstring: impl Into<String>, count: u64) {
        let key = bitstring.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 += count,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, count));
            }
        }
    }

    /// Get the count for a bitstring.
    pub fn get(&self, bitstring: &str) -> u64 {
        self.index
            .get(bitstring)
            .map_or(0, |&i| self.entries[i].1)
    }

    /// Iterate over (bitstring, count) pairs in first-observed order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Get the total number of shots.
    pub fn total_shots(&self) -> u64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    /// Get sorted counts (by count, descending). The sort is stable.
    pub fn sorted(&self) -> Vec<(&str, u64)> {
        let mut items: Vec<_> = self.iter().collect();
        items.sort_by(|a, b| b.1.cmp(&a.1));
        items
    }

    /// Get the number of unique bitstrings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if counts are empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, u64)> for Counts {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl From<Vec<(String, u64)>> for Counts {
    fn from(pairs: Vec<(String, u64)>) -> Self {
        Self::from_pairs(pairs)
    }
}

impl From<Counts> for Vec<(String, u64)> {
    fn from(counts: Counts) -> Self {
        counts.entries
    }
}

/// Result of program execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Measurement counts.
    pub counts: Counts,
    /// Number of shots executed.
    pub shots: u32,
    /// Execution time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Additional metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ExecutionResult {
    /// Create a new execution result.
    pub fn new(counts: Counts, shots: u32) -> Self {
        Self {
            counts,
            shots,
            execution_time_ms: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the execution time.
    pub fn with_execution_time(mut self, time_ms: u64) -> Self {
        self.execution_time_ms = Some(time_ms);
        self
    }

    /// Set metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
