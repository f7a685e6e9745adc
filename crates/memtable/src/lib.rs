use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ValueEntry stores either a live value or a tombstone.
/// When `tombstone` is true, `value` is meaningless and kept as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueEntry {
    pub value: Option<String>,
    pub tombstone: bool,
}

impl ValueEntry {
    pub fn live(value: String) -> Self {
        Self {
            value: Some(value),
            tombstone: false,
        }
    }

    pub fn tombstone() -> Self {
        Self {
            value: None,
            tombstone: true,
        }
    }

    /// The value if this entry is live, `None` for a tombstone.
    pub fn live_value(&self) -> Option<&str> {
        if self.tombstone {
            None
        } else {
            self.value.as_deref()
        }
    }

    pub fn into_live_value(self) -> Option<String> {
        if self.tombstone {
            None
        } else {
            self.value
        }
    }
}

/// Approximate footprint of one entry: its JSON payload plus the key bytes.
pub fn entry_footprint(key: &str, entry: &ValueEntry) -> usize {
    serde_json::to_vec(entry).map_or(0, |b| b.len()) + key.len()
}

/// In-memory sorted write buffer.
///
/// The last `put`/`delete` for a key wins; there is no sequence ordering, the
/// caller applies mutations in log order.
#[derive(Debug)]
pub struct Memtable {
    map: BTreeMap<String, ValueEntry>,
    approx_size: usize,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
            approx_size: 0,
        }
    }

    pub fn put(&mut self, key: String, value: String) {
        self.set(key, ValueEntry::live(value));
    }

    /// Delete: record a tombstone so older on-disk values stay shadowed.
    pub fn delete(&mut self, key: String) {
        self.set(key, ValueEntry::tombstone());
    }

    /// Upsert, keeping `approx_size` in step with the current content.
    pub fn set(&mut self, key: String, entry: ValueEntry) {
        if let Some(old) = self.map.get(&key) {
            self.approx_size = self
                .approx_size
                .saturating_sub(entry_footprint(&key, old));
        }
        self.approx_size += entry_footprint(&key, &entry);
        self.map.insert(key, entry);
    }

    /// Returns the stored entry, tombstones included. `None` means the key
    /// was never written to this memtable.
    pub fn get(&self, key: &str) -> Option<&ValueEntry> {
        self.map.get(key)
    }

    /// All entries in ascending key order (the flush input).
    pub fn entries_sorted(&self) -> Vec<(String, ValueEntry)> {
        self.map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Entries with `start <= key <= end`, ascending, tombstones included.
    pub fn range(&self, start: &str, end: &str) -> Vec<(String, ValueEntry)> {
        if start > end {
            return Vec::new();
        }
        self.map
            .range::<str, _>((
                std::ops::Bound::Included(start),
                std::ops::Bound::Included(end),
            ))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}
