/// Read path: `read()` and `read_range()`.
///
/// Point lookups check the memtable first (freshest data), then SSTables
/// newest-first, skipping any whose bloom filter rules the key out. The first
/// match wins; tombstones shadow older values.
///
/// Range reads replay every source oldest to newest into one map, so later
/// (newer) sources overwrite earlier ones, then drop tombstones.
use memtable::ValueEntry;
use std::collections::BTreeMap;

use crate::{Engine, Result};

impl Engine {
    /// Looks up a key, returning its value if found and live.
    ///
    /// # Errors
    ///
    /// Returns an error if an SSTable read fails (e.g. corruption, I/O).
    pub fn read(&self, key: &str) -> Result<Option<String>> {
        // 1. Memtable is authoritative (and respects tombstones)
        if let Some(entry) = self.mem.get(key) {
            return Ok(entry.live_value().map(str::to_string));
        }

        // 2. Tables, newest -> oldest
        for sst in &self.tables {
            if !sst.may_contain(key) {
                continue;
            }
            if let Some(entry) = sst.get(key)? {
                // tombstone hides older values
                return Ok(entry.into_live_value());
            }
        }

        Ok(None)
    }

    /// Returns every live key in `[start, end]` (both inclusive) with its
    /// most recent value, in ascending key order.
    ///
    /// An empty result is returned when `start > end`.
    pub fn read_range(&self, start: &str, end: &str) -> Result<Vec<(String, String)>> {
        let mut merged: BTreeMap<String, ValueEntry> = BTreeMap::new();
        if start > end {
            return Ok(Vec::new());
        }

        // Oldest table first so newer tables overwrite.
        for sst in self.tables.iter().rev() {
            for (key, entry) in sst.range(start, end)? {
                merged.insert(key, entry);
            }
        }

        // Memtable last: highest recency.
        for (key, entry) in self.mem.range(start, end) {
            merged.insert(key, entry);
        }

        Ok(merged
            .into_iter()
            .filter_map(|(key, entry)| entry.into_live_value().map(|v| (key, v)))
            .collect())
    }
}
