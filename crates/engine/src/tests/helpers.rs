use std::fs;
use std::path::Path;

use crate::{Engine, EngineOptions};

/// Engine under `dir/wal` and `dir/sst` with a large flush threshold.
pub fn open_engine(dir: &Path) -> Engine {
    open_with(dir, EngineOptions::default())
}

/// Engine that flushes once the memtable reaches `memtable_max_bytes`.
pub fn open_flushing(dir: &Path, memtable_max_bytes: usize) -> Engine {
    open_with(
        dir,
        EngineOptions {
            memtable_max_bytes,
            ..EngineOptions::default()
        },
    )
}

pub fn open_with(dir: &Path, opts: EngineOptions) -> Engine {
    Engine::open(dir.join("wal"), dir.join("sst"), opts).unwrap()
}

pub fn count_files_with_ext(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|x| x == ext)
                .unwrap_or(false)
        })
        .count()
}

pub fn count_sst_files(dir: &Path) -> usize {
    count_files_with_ext(&dir.join("sst"), "sst")
}

pub fn count_wal_segments(dir: &Path) -> usize {
    count_files_with_ext(&dir.join("wal"), "wal")
}
