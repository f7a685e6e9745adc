/// Compaction: merges the two oldest SSTables into one.
///
/// The inputs are merged oldest first so the newer table's entries win.
/// Since the oldest table is always an input, no older table remains for a
/// tombstone to shadow and deleted keys are dropped from the output. The
/// output is written atomically (temp file + rename), takes the inputs' place
/// at the old end of the table list, and the input files are deleted. When
/// every key was deleted no output is written at all.
use sstable::{merge, parse_table_file_name, publish, table_file_name, temp_file_name, SSTableReader};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::{Engine, EngineError, Result};

impl Engine {
    /// Compacts the two oldest tables.
    ///
    /// The merged table is named after its newer input with the `-cmp`
    /// suffix so filename order on restart still places it behind every
    /// table that was not compacted.
    ///
    /// Returns `false` when fewer than two tables exist.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure during merge, write, or rename. Input
    /// files are only deleted after the merged table is published.
    pub fn compact(&mut self) -> Result<bool> {
        let n = self.tables.len();
        if n < 2 {
            return Ok(false);
        }

        let oldest = self.tables[n - 1].path().to_path_buf();
        let newer = self.tables[n - 2].path().to_path_buf();

        let newer_id = newer
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(parse_table_file_name)
            .map(|(id, _)| id)
            .ok_or_else(|| {
                EngineError::Storage(anyhow::anyhow!(
                    "unexpected table name {}",
                    newer.display()
                ))
            })?;

        let name = table_file_name(newer_id, true);
        let out = self.sst_dir.join(&name);
        let tmp = self.sst_dir.join(temp_file_name(&name));

        let inputs: Vec<PathBuf> = vec![oldest, newer];
        let records = merge(&inputs, &tmp, true)?;
        self.tables.truncate(n - 2);
        if records > 0 {
            publish(&tmp, &out)?;
            let reader = SSTableReader::open(&out)?;
            self.tables.push(reader);
        }

        for p in inputs.iter().filter(|p| **p != out) {
            if let Err(e) = std::fs::remove_file(p) {
                warn!(table = %p.display(), error = %e, "failed to delete compacted input");
            }
        }

        info!(
            output = %out.display(),
            records,
            tables = self.tables.len(),
            "compacted two oldest tables"
        );
        Ok(true)
    }

    /// Compacts until the table count no longer exceeds the trigger.
    ///
    /// Returns the number of compactions performed.
    pub fn compact_to_trigger(&mut self) -> Result<usize> {
        let mut rounds = 0;
        while self.needs_compaction() {
            if !self.compact()? {
                break;
            }
            rounds += 1;
        }
        Ok(rounds)
    }
}
