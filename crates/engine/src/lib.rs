//! # Engine - SiltKV Storage Engine
//!
//! The central orchestrator that ties together the [`memtable`], [`wal`], and
//! [`sstable`] crates into a log-structured key-value store, plus the
//! replication seam used by the serving layer.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                 Db (shared)                   │
//! │  validate + admit → replicate → commit        │
//! ├───────────────────────────────────────────────┤
//! │                   ENGINE                      │
//! │                                               │
//! │ write.rs → WAL append → Memtable apply        │
//! │              |                                │
//! │              |  (memtable >= max bytes?)      │
//! │              |            yes                 │
//! │              v                                │
//! │           flush() → new SSTable, rotate WAL   │
//! │                                               │
//! │ maintenance → idle flush, compact() oldest 2  │
//! │                                               │
//! │ read.rs → Memtable → SSTables newest..oldest  │
//! │            (first match wins)                 │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                               |
//! |-----------------|-------------------------------------------------------|
//! | [`lib.rs`]      | `Engine` struct, options, errors, accessors, `Drop`   |
//! | [`recovery`]    | tmp file cleanup, SSTable loading, WAL replay         |
//! | [`write`]       | `put()`, `delete()`, `batch_put()`, `flush()`         |
//! | [`read`]        | `read()`, `read_range()`                              |
//! | [`compaction`]  | `compact()` of the two oldest tables                  |
//! | [`replica`]     | follower ingestion without backpressure               |
//! | [`replicate`]   | `Replicate` trait and the no-peer implementation      |
//! | [`db`]          | cloneable async handle used by the server             |
//! | [`maintenance`] | background WAL flush, idle flush and compaction       |
//!
//! ## Crash Safety
//!
//! Every write is appended to the WAL before the Memtable update. SSTables
//! are written to a temporary file and renamed into place. WAL segments are
//! only deleted after the memtable they cover has been published as a table.
mod compaction;
mod db;
pub mod maintenance;
mod read;
mod recovery;
mod replica;
mod replicate;
mod write;

use config::Config;
use memtable::Memtable;
use sstable::SSTableReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use wal::{Wal, WalError, WalOptions};

pub use db::Db;
pub use memtable::ValueEntry;
pub use replicate::{NoReplication, Replicate};
pub use wal::WalRecord;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// Errors surfaced by engine operations.
///
/// A missing key is not an error: reads return `Ok(None)`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any side effect.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Pending bytes exceed the inflight ceiling. Retryable.
    #[error("store overloaded")]
    Overloaded,

    #[error(transparent)]
    Wal(#[from] WalError),

    /// SSTable read, write or merge failure.
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Size limits and WAL behaviour for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Memtable byte-size threshold that triggers a flush.
    pub memtable_max_bytes: usize,
    /// Writes are rejected while memtable + buffered WAL bytes exceed this.
    pub max_inflight_bytes: usize,
    pub wal: WalOptions,
    /// Delete WAL segments older than the active one after each flush.
    pub prune_wal_on_flush: bool,
    /// Table count above which [`Engine::needs_compaction`] reports true.
    pub compaction_trigger: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            memtable_max_bytes: cfg.memtable_max_bytes,
            max_inflight_bytes: cfg.max_inflight_bytes,
            wal: WalOptions {
                batch_size: cfg.wal_batch_size,
                fsync_per_append: cfg.wal_fsync_per_append,
            },
            prune_wal_on_flush: cfg.wal_prune_on_flush,
            compaction_trigger: cfg.compaction_trigger,
        }
    }
}

/// The storage engine: one WAL, one Memtable and the on-disk table set.
///
/// # Write Path
///
/// 1. Validate the key/value and check the inflight-byte ceiling.
/// 2. Append the record to the WAL.
/// 3. Apply the mutation to the Memtable.
/// 4. If `approx_size >= memtable_max_bytes`, flush the Memtable to a new
///    SSTable and rotate the WAL.
///
/// Replication happens between steps 1 and 2 and is driven by [`Db`].
///
/// # Read Path
///
/// 1. Check the Memtable (freshest data, includes tombstones).
/// 2. Check SSTables from newest to oldest, skipping those whose bloom filter
///    rules the key out.
/// 3. First match wins; tombstones shadow older values.
///
/// # Recovery
///
/// On construction ([`Engine::open`]) existing `.sst` files are loaded (metadata
/// only) and every WAL segment is replayed into a fresh Memtable.
pub struct Engine {
    pub(crate) mem: Memtable,
    /// On-disk tables, newest first.
    pub(crate) tables: Vec<SSTableReader>,
    pub(crate) wal: Wal,
    pub(crate) sst_dir: PathBuf,
    pub(crate) opts: EngineOptions,
    /// Highest table id handed out or loaded so far.
    pub(crate) last_table_id: u64,
    pub(crate) last_write: Instant,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("opts", &self.opts)
            .field("sst_dir", &self.sst_dir)
            .field("wal", &self.wal)
            .field("memtable_size", &self.mem.approx_size())
            .field("memtable_entries", &self.mem.len())
            .field("sstable_count", &self.tables.len())
            .finish()
    }
}

impl Engine {
    /// Opens the engine with WAL segments under `wal_dir` and tables under
    /// `sst_dir`, creating both if needed.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create the SST directory if it does not exist.
    /// 2. Remove leftover `.tmp-` files from interrupted flushes/compactions.
    /// 3. Load every table's metadata, newest first. Unreadable tables are
    ///    logged and skipped.
    /// 4. Open the WAL (a fresh active segment) and replay all segments into
    ///    a new Memtable.
    pub fn open<P1: AsRef<Path>, P2: AsRef<Path>>(
        wal_dir: P1,
        sst_dir: P2,
        opts: EngineOptions,
    ) -> Result<Self> {
        let sst_dir = sst_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&sst_dir)?;

        recovery::cleanup_tmp_files(&sst_dir);
        let (tables, last_table_id) = recovery::load_tables(&sst_dir)?;

        let wal = Wal::open(wal_dir.as_ref(), opts.wal)?;
        let mut mem = Memtable::new();
        let replayed = wal.replay_all(&mut mem)?;

        tracing::info!(
            tables = tables.len(),
            replayed,
            memtable_bytes = mem.approx_size(),
            "engine recovered"
        );

        Ok(Self {
            mem,
            tables,
            wal,
            sst_dir,
            opts,
            last_table_id,
            last_write: Instant::now(),
        })
    }

    /// Opens the engine at `cfg.wal_dir()` / `cfg.sst_dir()`.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::open(cfg.wal_dir(), cfg.sst_dir(), EngineOptions::from(cfg))
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.opts
    }

    /// Updates the flush threshold. Useful for testing or runtime tuning.
    pub fn set_memtable_max_bytes(&mut self, bytes: usize) {
        self.opts.memtable_max_bytes = bytes;
    }

    /// Updates the backpressure ceiling.
    pub fn set_max_inflight_bytes(&mut self, bytes: usize) {
        self.opts.max_inflight_bytes = bytes;
    }

    #[must_use]
    pub fn sstable_count(&self) -> usize {
        self.tables.len()
    }

    /// Table paths, newest first.
    #[must_use]
    pub fn sstable_paths(&self) -> Vec<PathBuf> {
        self.tables.iter().map(|t| t.path().to_path_buf()).collect()
    }

    #[must_use]
    pub fn memtable_size(&self) -> usize {
        self.mem.approx_size()
    }

    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.mem.len()
    }

    /// Memtable bytes plus WAL bytes not yet written to disk.
    #[must_use]
    pub fn inflight_bytes(&self) -> usize {
        self.mem.approx_size() + self.wal.buffered_bytes()
    }

    /// Time since the last accepted write (or since open).
    #[must_use]
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_write.elapsed()
    }

    /// True when the table count exceeds the compaction trigger.
    #[must_use]
    pub fn needs_compaction(&self) -> bool {
        self.opts.compaction_trigger > 0 && self.tables.len() > self.opts.compaction_trigger
    }

    #[must_use]
    pub fn sst_dir(&self) -> &Path {
        &self.sst_dir
    }

    #[must_use]
    pub fn wal(&self) -> &Wal {
        &self.wal
    }
}

/// Best-effort WAL flush on drop.
///
/// Records still sitting in the WAL buffer are written out so they survive a
/// restart. Errors are ignored because Drop cannot propagate them.
impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.wal.flush() {
            tracing::warn!(error = %e, "failed to flush wal on drop");
        }
    }
}

#[cfg(test)]
mod tests;
