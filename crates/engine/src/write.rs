/// Write path: `put()`, `delete()`, `batch_put()`, and `flush()`.
///
/// All mutations flow through this module. Each write is validated and
/// checked against the inflight-byte ceiling, appended to the WAL, then
/// applied to the Memtable. When the Memtable reaches the configured flush
/// threshold it is persisted to a new SSTable on disk.
///
/// The `prepare_*` / `commit*` split lets [`crate::Db`] replicate a record
/// between admission and logging.
use memtable::Memtable;
use sstable::{publish, table_file_name, temp_file_name, SSTableReader, SSTableWriter};
use std::fs;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use wal::WalRecord;

use crate::{Engine, EngineError, Result, MAX_KEY_SIZE, MAX_VALUE_SIZE};

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(EngineError::Validation("key must not be empty".into()));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(EngineError::Validation(format!(
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(())
}

pub(crate) fn validate_value(value: &str) -> Result<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(EngineError::Validation(format!(
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        )));
    }
    Ok(())
}

impl Engine {
    /// Inserts or overwrites a key.
    ///
    /// # Errors
    ///
    /// [`EngineError::Validation`] for a bad key or value,
    /// [`EngineError::Overloaded`] when the inflight ceiling is exceeded, or
    /// an I/O error from the WAL or an automatic flush.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let rec = self.prepare_put(key.into(), value.into())?;
        self.commit(&rec)
    }

    /// Deletes a key by writing a tombstone.
    ///
    /// The tombstone shadows any older value in SSTables.
    pub fn delete(&mut self, key: impl Into<String>) -> Result<()> {
        let rec = self.prepare_delete(key.into())?;
        self.commit(&rec)
    }

    /// Writes several key-value pairs as one WAL batch.
    ///
    /// The batch is logged and fsynced as a unit, then applied item by item.
    /// An empty batch is a no-op.
    pub fn batch_put(&mut self, items: Vec<(String, String)>) -> Result<()> {
        let recs = self.prepare_batch(items)?;
        self.commit_batch(&recs)
    }

    /// Validates and admits a put, returning the record to log.
    ///
    /// Has no side effects.
    pub fn prepare_put(&self, key: String, value: String) -> Result<WalRecord> {
        validate_key(&key)?;
        validate_value(&value)?;
        self.admit(0)?;
        Ok(WalRecord::put(key, value))
    }

    /// Validates and admits a delete, returning the record to log.
    pub fn prepare_delete(&self, key: String) -> Result<WalRecord> {
        validate_key(&key)?;
        self.admit(0)?;
        Ok(WalRecord::del(key))
    }

    /// Validates every item and admits the batch with its key and value bytes
    /// counted as pending.
    pub fn prepare_batch(&self, items: Vec<(String, String)>) -> Result<Vec<WalRecord>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut pending = 0usize;
        for (key, value) in &items {
            validate_key(key)?;
            validate_value(value)?;
            pending += key.len() + value.len();
        }
        self.admit(pending)?;
        Ok(items
            .into_iter()
            .map(|(k, v)| WalRecord::put(k, v))
            .collect())
    }

    /// Rejects the write if memtable + buffered WAL + `pending` bytes exceed
    /// the inflight ceiling.
    pub(crate) fn admit(&self, pending: usize) -> Result<()> {
        let inflight = self.inflight_bytes() + pending;
        if inflight > self.opts.max_inflight_bytes {
            debug!(
                inflight,
                max = self.opts.max_inflight_bytes,
                "rejecting write: overloaded"
            );
            return Err(EngineError::Overloaded);
        }
        Ok(())
    }

    /// Appends one admitted record to the WAL, applies it to the Memtable and
    /// flushes if the Memtable has reached its threshold.
    pub fn commit(&mut self, rec: &WalRecord) -> Result<()> {
        self.wal.append(rec)?;
        rec.apply_to(&mut self.mem);
        self.last_write = Instant::now();
        self.maybe_flush()
    }

    /// Logs `recs` as one fsynced batch, then applies them in order.
    pub fn commit_batch(&mut self, recs: &[WalRecord]) -> Result<()> {
        if recs.is_empty() {
            return Ok(());
        }
        self.wal.append_batch(recs)?;
        for rec in recs {
            rec.apply_to(&mut self.mem);
        }
        self.last_write = Instant::now();
        self.maybe_flush()
    }

    pub(crate) fn maybe_flush(&mut self) -> Result<()> {
        if self.mem.approx_size() >= self.opts.memtable_max_bytes {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes buffered WAL records to disk and fsyncs the active segment.
    pub fn flush_wal(&mut self) -> Result<()> {
        self.wal.flush()?;
        Ok(())
    }

    /// Persists the Memtable as a new SSTable.
    ///
    /// Returns the new table's path, or `None` if the Memtable was empty.
    /// Exclusive `&mut self` access means a flush never overlaps another.
    ///
    /// # Steps
    ///
    /// 1. Drain the Memtable into a sorted entry list.
    /// 2. Write `.tmp-sst-<id>.sst` and rename it to `sst-<id>.sst`.
    /// 3. Open the table and insert it at position 0 (newest), then replace
    ///    the Memtable. Any failure up to here leaves the Memtable and WAL
    ///    untouched.
    /// 4. Rotate the WAL so new writes land in a fresh segment.
    /// 5. Optionally delete the segments the new table now covers.
    pub fn flush(&mut self) -> Result<Option<PathBuf>> {
        let entries = self.mem.entries_sorted();
        if entries.is_empty() {
            return Ok(None);
        }

        let id = self.next_table_id();
        let name = table_file_name(id, false);
        let path = self.sst_dir.join(&name);
        let tmp = self.sst_dir.join(temp_file_name(&name));

        SSTableWriter::write(&tmp, &entries)?;
        publish(&tmp, &path)?;

        // The Memtable and WAL stay authoritative until the table is readable.
        let reader = match SSTableReader::open(&path) {
            Ok(reader) => reader,
            Err(e) => {
                if let Err(rm) = fs::remove_file(&path) {
                    warn!(table = %path.display(), error = %rm, "failed to remove unreadable table");
                }
                return Err(e.into());
            }
        };
        self.tables.insert(0, reader);
        self.mem = Memtable::new();

        self.wal.rotate()?;
        if self.opts.prune_wal_on_flush {
            self.wal.prune_before_active()?;
        }

        info!(
            table = %path.display(),
            records = entries.len(),
            tables = self.tables.len(),
            "flushed memtable"
        );
        Ok(Some(path))
    }

    /// Flushes the Memtable if it holds anything.
    pub fn force_flush(&mut self) -> Result<()> {
        self.flush().map(|_| ())
    }

    /// Strictly increasing, millisecond-derived table id.
    pub(crate) fn next_table_id(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_table_id = now.max(self.last_table_id + 1);
        self.last_table_id
    }
}
