//! Memory Store Statistics
//!
//! Counters describing how the in-process store has been used.

use serde::Serialize;

// == Store Stats ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Reads that found a live string value
    pub hits: u64,
    /// Reads that found nothing (absent or expired)
    pub misses: u64,
    /// Keys dropped because the store was full
    pub evictions: u64,
    /// Keys dropped because their TTL elapsed
    pub expired: u64,
    /// Commands received, of any kind
    pub commands: u64,
    /// Current number of keys
    pub total_entries: usize,
}

impl StoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// hits / (hits + misses), or 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expired(&mut self, count: usize) {
        self.expired += count as u64;
    }

    pub fn record_command(&mut self) {
        self.commands += 1;
    }
}
