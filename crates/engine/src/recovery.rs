/// Cold-start helpers: temporary file cleanup and SSTable loading.
///
/// WAL replay itself lives in [`wal::Wal::replay_all`]; the engine calls it
/// once the table set is loaded.
use sstable::{parse_table_file_name, SSTableReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::Result;

/// Prefix of in-progress table writes.
const TMP_PREFIX: &str = ".tmp-";

/// Removes leftover `.tmp-*` files from interrupted flushes or compactions.
pub(crate) fn cleanup_tmp_files(sst_dir: &Path) {
    if let Ok(entries) = std::fs::read_dir(sst_dir) {
        for entry in entries.flatten() {
            let p = entry.path();
            if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                if name.starts_with(TMP_PREFIX) {
                    debug!(file = %p.display(), "removing leftover temp table");
                    let _ = std::fs::remove_file(&p);
                }
            }
        }
    }
}

/// Opens every table in `sst_dir`, returning them newest first together with
/// the highest table id seen.
///
/// Recency follows the id in the file name. When a flush table and a
/// compaction output share an id, the compaction output is treated as older.
/// Tables whose metadata cannot be parsed are skipped with a warning.
pub(crate) fn load_tables(sst_dir: &Path) -> Result<(Vec<SSTableReader>, u64)> {
    let mut found: Vec<(u64, bool, PathBuf)> = std::fs::read_dir(sst_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|p| {
            let name = p.file_name()?.to_str()?;
            let (id, compacted) = parse_table_file_name(name)?;
            Some((id, compacted, p))
        })
        .collect();

    // oldest first: by id, compacted before flush output on ties
    found.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let max_id = found.iter().map(|(id, _, _)| *id).max().unwrap_or(0);

    let mut tables = Vec::with_capacity(found.len());
    for (_, _, path) in found.into_iter().rev() {
        match SSTableReader::open(&path) {
            Ok(reader) => tables.push(reader),
            Err(e) => warn!(table = %path.display(), error = %e, "skipping unreadable sstable"),
        }
    }
    Ok((tables, max_id))
}
