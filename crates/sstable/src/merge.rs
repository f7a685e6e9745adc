//! N-way merge of SSTables for compaction.
//!
//! Inputs are replayed in the order given into one key -> entry map, so a
//! later input overwrites an earlier one for the same key. Callers pass
//! inputs **oldest first** so the newest version of every key survives.
//! A merge that includes the oldest table in the store has nothing older
//! left to shadow, so its caller asks for tombstones to be dropped. Any
//! other merge must carry them through.

use anyhow::{Context, Result};
use memtable::ValueEntry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{SSTableReader, SSTableWriter};

/// Merges `inputs` (oldest first) into a new table at `output`.
///
/// With `drop_tombstones` set, deleted keys are left out entirely. Returns
/// the number of records written; when that is zero no file is created.
pub fn merge(inputs: &[PathBuf], output: &Path, drop_tombstones: bool) -> Result<usize> {
    let mut merged: BTreeMap<String, ValueEntry> = BTreeMap::new();

    for input in inputs {
        let reader = SSTableReader::open(input)
            .with_context(|| format!("failed to open merge input {}", input.display()))?;
        for (key, entry) in reader.entries()? {
            merged.insert(key, entry);
        }
    }

    let entries: Vec<(String, ValueEntry)> = merged
        .into_iter()
        .filter(|(_, e)| !(drop_tombstones && e.tombstone))
        .collect();
    if entries.is_empty() {
        return Ok(0);
    }
    SSTableWriter::write(output, &entries)
}
