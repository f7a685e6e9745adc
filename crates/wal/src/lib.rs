//! # WAL - Write-Ahead Log
//!
//! Provides crash-safe durability for the SiltKV storage engine.
//!
//! Every mutation (`put` or `del`) is serialized as one line and appended to
//! the active WAL segment before the memtable is considered rebuilt from it.
//! Appends are buffered in memory and written out when the buffer reaches the
//! batch size, on an explicit [`Wal::flush`] (the engine drives this from a
//! timer), or after every append when per-append fsync is enabled. Batches
//! are always flushed before [`Wal::append_batch`] returns.
//!
//! ## Segments
//!
//! The log is a directory of segments named `wal-<id>.wal`, where `<id>` is a
//! zero-padded, strictly increasing number derived from the wall clock.
//! [`Wal::rotate`] closes the active segment and opens a new one; replay reads
//! every segment in filename (creation) order.
//!
//! ## Line Format
//!
//! ```text
//! <crc32: 8 hex digits> <json record>\n
//! ```
//!
//! The CRC32 covers the JSON bytes. A final line that is incomplete or fails
//! its checksum is a torn tail and ends replay of that segment; a bad line
//! followed by more lines is reported as [`WalError::Corrupt`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use memtable::Memtable;
//! use wal::{Wal, WalOptions, WalRecord};
//!
//! let mut w = Wal::open("data/wal", WalOptions::default()).unwrap();
//! w.append(&WalRecord::put("hello", "world")).unwrap();
//! w.flush().unwrap();
//!
//! let mut mem = Memtable::new();
//! w.replay_all(&mut mem).unwrap();
//! ```

use crc32fast::Hasher as Crc32;
use memtable::Memtable;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of buffered records that forces a flush.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Maximum line size accepted during replay (64 MiB safety cap).
const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

const SEGMENT_PREFIX: &str = "wal-";
const SEGMENT_EXT: &str = "wal";

/// A single logical write.
///
/// Serialized with an `op` tag: `{"op":"put","k":..,"v":..,"ts":..}` or
/// `{"op":"del","k":..,"ts":..}`. Unknown tags fail to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WalRecord {
    /// A key-value insertion.
    Put {
        #[serde(rename = "k")]
        key: String,
        #[serde(rename = "v")]
        value: String,
        /// Milliseconds since the Unix epoch. Advisory only.
        #[serde(default)]
        ts: u64,
    },
    /// A key deletion (tombstone).
    Del {
        #[serde(rename = "k")]
        key: String,
        #[serde(default)]
        ts: u64,
    },
}

impl WalRecord {
    /// Builds a `Put` stamped with the current time.
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        WalRecord::Put {
            key: key.into(),
            value: value.into(),
            ts: now_millis(),
        }
    }

    /// Builds a `Del` stamped with the current time.
    pub fn del(key: impl Into<String>) -> Self {
        WalRecord::Del {
            key: key.into(),
            ts: now_millis(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            WalRecord::Put { key, .. } | WalRecord::Del { key, .. } => key,
        }
    }

    /// Applies the mutation to a memtable.
    pub fn apply_to(&self, mem: &mut Memtable) {
        match self {
            WalRecord::Put { key, value, .. } => mem.put(key.clone(), value.clone()),
            WalRecord::Del { key, .. } => mem.delete(key.clone()),
        }
    }
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A line failed its checksum or did not decode, and was not the tail.
    #[error("corrupt record in {} at line {line}", segment.display())]
    Corrupt { segment: PathBuf, line: usize },
}

/// Tuning knobs for the writer side of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalOptions {
    /// Buffered record count that triggers a synchronous flush.
    pub batch_size: usize,
    /// If true, every append is written and fsynced before returning.
    pub fsync_per_append: bool,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            fsync_per_append: false,
        }
    }
}

/// Segmented, buffered write-ahead log.
///
/// Owns exactly one active segment file. Older segments stay on disk until
/// [`prune_before_active`](Wal::prune_before_active) removes them.
pub struct Wal {
    dir: PathBuf,
    file: File,
    active: PathBuf,
    active_id: u64,
    opts: WalOptions,
    /// Encoded lines not yet written to the active segment.
    buf: Vec<u8>,
    buffered_records: usize,
}

impl Wal {
    /// Creates `dir` if needed and opens a fresh active segment in it.
    ///
    /// Existing segments are left untouched so they can be replayed.
    pub fn open<P: AsRef<Path>>(dir: P, opts: WalOptions) -> Result<Self, WalError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let last_id = list_segments(&dir)?
            .iter()
            .filter_map(|p| segment_id(p))
            .max()
            .unwrap_or(0);
        let (active_id, active, file) = open_segment(&dir, last_id)?;

        Ok(Self {
            dir,
            file,
            active,
            active_id,
            opts,
            buf: Vec::with_capacity(4096),
            buffered_records: 0,
        })
    }

    /// Buffers `record`; flushes when the batch fills up or when per-append
    /// fsync is enabled.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        encode_line(record, &mut self.buf)?;
        self.buffered_records += 1;

        if self.buffered_records >= self.opts.batch_size || self.opts.fsync_per_append {
            self.flush()?;
        }
        Ok(())
    }

    /// Buffers every record, then flushes unconditionally.
    pub fn append_batch(&mut self, records: &[WalRecord]) -> Result<(), WalError> {
        for record in records {
            encode_line(record, &mut self.buf)?;
            self.buffered_records += 1;
        }
        self.flush()
    }

    /// Writes buffered lines to the active segment and fsyncs it.
    ///
    /// No-op when nothing is buffered. On failure the buffer is kept and the
    /// segment is cut back to its previous length, so a later flush writes
    /// the same lines again without leaving a partial line in front of them.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        write_segment(&mut self.file, &self.buf)?;

        self.buf.clear();
        self.buffered_records = 0;
        Ok(())
    }

    /// Flushes and closes the active segment, then opens a new one.
    ///
    /// Returns the path of the segment that was closed. Prior segments are
    /// not deleted.
    pub fn rotate(&mut self) -> Result<PathBuf, WalError> {
        self.flush()?;
        self.file.sync_all()?;

        let (id, path, file) = open_segment(&self.dir, self.active_id)?;
        let closed = std::mem::replace(&mut self.active, path);
        self.file = file;
        self.active_id = id;
        debug!(closed = %closed.display(), active = %self.active.display(), "rotated wal segment");
        Ok(closed)
    }

    /// Replays every segment, oldest first, into `mem`.
    ///
    /// Returns the number of records applied. Buffered (unflushed) records
    /// are not included.
    pub fn replay_all(&self, mem: &mut Memtable) -> Result<usize, WalError> {
        let mut applied = 0;
        for segment in list_segments(&self.dir)? {
            let mut reader = WalReader::open(&segment)?;
            reader.replay(|rec| {
                rec.apply_to(mem);
                applied += 1;
            })?;
        }
        Ok(applied)
    }

    /// Deletes every segment older than the active one.
    ///
    /// Only safe once the records they hold are persisted elsewhere (i.e.
    /// right after a memtable flush). Returns how many segments were removed.
    pub fn prune_before_active(&mut self) -> Result<usize, WalError> {
        let mut removed = 0;
        for segment in list_segments(&self.dir)? {
            match segment_id(&segment) {
                Some(id) if id < self.active_id => {
                    fs::remove_file(&segment)?;
                    removed += 1;
                }
                _ => {}
            }
        }
        if removed > 0 {
            debug!(removed, "pruned wal segments");
        }
        Ok(removed)
    }

    /// Size of the encoded lines waiting in the buffer.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn buffered_records(&self) -> usize {
        self.buffered_records
    }

    #[must_use]
    pub fn active_segment(&self) -> &Path {
        &self.active
    }

    /// All segment paths in the log directory, oldest first.
    pub fn segments(&self) -> Result<Vec<PathBuf>, WalError> {
        list_segments(&self.dir)
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("dir", &self.dir)
            .field("active", &self.active)
            .field("opts", &self.opts)
            .field("buffered_bytes", &self.buf.len())
            .field("buffered_records", &self.buffered_records)
            .finish()
    }
}

/// Sequential reader over one segment.
///
/// Generic over any `Read` implementor so tests can replay in-memory buffers.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
    name: PathBuf,
}

impl WalReader<File> {
    /// Opens an existing segment for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path.as_ref())?;
        Ok(WalReader {
            rdr: BufReader::new(f),
            name: path.as_ref().to_path_buf(),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
            name: PathBuf::from("<memory>"),
        }
    }

    /// Replays every valid record, calling `apply` for each one in file order.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** -> `Ok(())`.
    /// - **Torn tail** (last line incomplete or failing its checksum) ->
    ///   `Ok(())` after yielding every complete record before it.
    /// - **Bad line with more lines after it** -> `Err(WalError::Corrupt)`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        let mut line = Vec::with_capacity(256);
        let mut line_no = 0usize;
        // A bad line is only fatal if something follows it.
        let mut pending_bad: Option<usize> = None;

        loop {
            line.clear();
            let n = self.rdr.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            line_no += 1;

            if let Some(bad) = pending_bad {
                return Err(WalError::Corrupt {
                    segment: self.name.clone(),
                    line: bad,
                });
            }

            if line.last() != Some(&b'\n') {
                warn!(segment = %self.name.display(), line = line_no, "ignoring incomplete wal tail");
                break;
            }
            line.pop();
            if line.is_empty() {
                continue;
            }

            match decode_line(&line) {
                Some(rec) => apply(rec),
                None => pending_bad = Some(line_no),
            }
        }

        if let Some(bad) = pending_bad {
            warn!(segment = %self.name.display(), line = bad, "ignoring torn wal tail");
        }
        Ok(())
    }
}

/// Appends `<crc> <json>\n` for `record` to `out`.
pub fn encode_line(record: &WalRecord, out: &mut Vec<u8>) -> Result<(), WalError> {
    let json = serde_json::to_vec(record)?;
    let mut hasher = Crc32::new();
    hasher.update(&json);
    write!(out, "{:08x} ", hasher.finalize())?;
    out.extend_from_slice(&json);
    out.push(b'\n');
    Ok(())
}

/// Parses one line (without its newline). `None` on any checksum or decode
/// failure.
fn decode_line(line: &[u8]) -> Option<WalRecord> {
    if line.len() < 10 || line.len() > MAX_LINE_BYTES || line[8] != b' ' {
        return None;
    }
    let crc_hex = std::str::from_utf8(&line[..8]).ok()?;
    let expected = u32::from_str_radix(crc_hex, 16).ok()?;
    let json = &line[9..];

    let mut hasher = Crc32::new();
    hasher.update(json);
    if hasher.finalize() != expected {
        return None;
    }
    serde_json::from_slice(json).ok()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn segment_name(id: u64) -> String {
    format!("{}{:020}.{}", SEGMENT_PREFIX, id, SEGMENT_EXT)
}

fn segment_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(".wal")?
        .parse()
        .ok()
}

/// The storage behind the active segment.
///
/// Implemented for [`File`]; tests substitute an in-memory device that runs
/// out of space part way through a write.
pub(crate) trait SegmentFile: Write {
    fn size(&self) -> io::Result<u64>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl SegmentFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Appends `buf` to `seg` and syncs it, or restores the previous length.
pub(crate) fn write_segment<S: SegmentFile>(seg: &mut S, buf: &[u8]) -> io::Result<()> {
    let start = seg.size()?;
    let written = seg
        .write_all(buf)
        .and_then(|_| seg.flush())
        .and_then(|_| seg.sync());

    if let Err(e) = written {
        if let Err(undo) = seg.truncate(start) {
            warn!(error = %undo, len = start, "failed to roll back partial wal write");
        }
        return Err(e);
    }
    Ok(())
}

/// Opens a new segment whose id is the current time in ms, or `after + 1`
/// if the clock has not moved past `after`.
fn open_segment(dir: &Path, after: u64) -> Result<(u64, PathBuf, File), WalError> {
    let id = now_millis().max(after + 1);
    let path = dir.join(segment_name(id));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((id, path, file))
}

fn list_segments(dir: &Path) -> Result<Vec<PathBuf>, WalError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| segment_id(p).is_some())
        .collect();
    paths.sort();
    Ok(paths)
}
