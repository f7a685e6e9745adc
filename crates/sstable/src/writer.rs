use anyhow::{bail, Context, Result};
use bloom::BloomFilter;
use memtable::ValueEntry;
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::format::{DataLineRef, Footer, IndexEntry, DEFAULT_INDEX_INTERVAL, SSTABLE_MAGIC};

/// Writes sorted entries to disk as an immutable SSTable file.
///
/// The writer is stateless. It writes straight to the given path; callers
/// write to a temporary name and [`publish`] it so a crash mid-write never
/// exposes a partial table.
pub struct SSTableWriter {}

impl SSTableWriter {
    /// Writes `entries` to `path` with the default index stride.
    ///
    /// `entries` must be strictly ascending by key with no duplicates, which
    /// is what [`memtable::Memtable::entries_sorted`] and [`crate::merge`]
    /// produce. Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns an error if `entries` is empty or out of order, or on any I/O
    /// failure.
    pub fn write(path: &Path, entries: &[(String, ValueEntry)]) -> Result<usize> {
        Self::write_with_interval(path, entries, DEFAULT_INDEX_INTERVAL)
    }

    /// Same as [`write`](SSTableWriter::write) with an explicit sparse index
    /// stride.
    pub fn write_with_interval(
        path: &Path,
        entries: &[(String, ValueEntry)],
        index_interval: usize,
    ) -> Result<usize> {
        if entries.is_empty() {
            bail!("refusing to write an empty SSTable (no entries)");
        }
        if index_interval == 0 {
            bail!("index interval must be > 0");
        }
        if let Some(w) = entries.windows(2).find(|w| w[0].0 >= w[1].0) {
            bail!(
                "entries not strictly sorted: {:?} followed by {:?}",
                w[0].0,
                w[1].0
            );
        }

        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create sstable {}", path.display()))?;
        let mut file = BufWriter::new(raw_file);

        let mut bloom = BloomFilter::default();
        let mut index: Vec<IndexEntry> = Vec::with_capacity(entries.len() / index_interval + 1);
        let mut offset: u64 = 0;
        let mut line: Vec<u8> = Vec::with_capacity(256);

        // DATA section
        for (i, (key, entry)) in entries.iter().enumerate() {
            if i % index_interval == 0 {
                index.push(IndexEntry {
                    key: key.clone(),
                    offset,
                });
            }

            line.clear();
            serde_json::to_writer(&mut line, &DataLineRef { k: key, v: entry })?;
            line.push(b'\n');
            file.write_all(&line)?;
            offset += line.len() as u64;

            bloom.insert(key);
        }

        // INDEX line, then BLOOM line
        let index_offset = offset;
        serde_json::to_writer(&mut file, &index)?;
        file.write_all(b"\n")?;
        serde_json::to_writer(&mut file, &bloom.summary())?;
        file.write_all(b"\n")?;

        // FOOTER line
        let footer = Footer {
            magic: SSTABLE_MAGIC.to_string(),
            index_offset,
        };
        serde_json::to_writer(&mut file, &footer)?;
        file.write_all(b"\n")?;

        // Flush BufWriter, then sync the underlying file
        file.flush()?;
        file.into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()?;

        Ok(entries.len())
    }
}

/// Atomically moves a fully written table from `tmp` to `path`.
///
/// Fsyncs the parent directory afterwards so the rename itself is durable.
/// On ext4/XFS a crash after rename but before the directory sync can lose
/// the entry.
pub fn publish(tmp: &Path, path: &Path) -> Result<()> {
    rename(tmp, path).with_context(|| {
        format!("failed to rename {} to {}", tmp.display(), path.display())
    })?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
