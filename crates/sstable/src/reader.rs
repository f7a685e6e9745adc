use anyhow::{bail, ensure, Context, Result};
use bloom::{BloomFilter, BloomSummary};
use memtable::ValueEntry;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::format::{DataLine, Footer, IndexEntry, READ_WINDOW_BYTES, SSTABLE_MAGIC};

/// How much of the file tail is read to locate the footer line.
const FOOTER_TAIL_BYTES: u64 = 4096;

/// Metadata handle for one SSTable: its sparse index and bloom filter.
///
/// [`open`](SSTableReader::open) loads only the tail of the file (footer,
/// index and bloom lines), so it costs O(metadata) regardless of how much
/// data the table holds. Lookups open the file on demand; no handle is kept,
/// which lets compaction delete or replace files freely.
pub struct SSTableReader {
    path: PathBuf,
    index: Vec<IndexEntry>,
    bloom: BloomFilter,
    /// Byte offset where the data region ends and the index line begins.
    index_offset: u64,
}

impl SSTableReader {
    /// Parses the footer and the two preceding metadata lines.
    ///
    /// # Validation
    ///
    /// - The footer must carry the `SSTABLEv1` magic.
    /// - `indexOffset` must point inside the file.
    /// - Exactly three lines (index, bloom, footer) must follow `indexOffset`.
    /// - Index entries must be ascending and point into the data region.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut f = File::open(&path)
            .with_context(|| format!("failed to open sstable {}", path.display()))?;
        let filesize = f.metadata()?.len();

        let footer = read_footer(&mut f, filesize)
            .with_context(|| format!("bad footer in {}", path.display()))?;
        if footer.magic != SSTABLE_MAGIC {
            bail!("unknown SSTable magic {:?} in {}", footer.magic, path.display());
        }
        let index_offset = footer.index_offset;
        if index_offset >= filesize {
            bail!("invalid index_offset {} in {}", index_offset, path.display());
        }

        // Everything from index_offset on is metadata: index, bloom, footer.
        f.seek(SeekFrom::Start(index_offset))?;
        let mut meta = String::new();
        f.read_to_string(&mut meta)?;
        let lines: Vec<&str> = meta.lines().collect();
        if lines.len() != 3 {
            bail!(
                "expected 3 metadata lines in {}, found {}",
                path.display(),
                lines.len()
            );
        }

        let index: Vec<IndexEntry> = serde_json::from_str(lines[0])
            .with_context(|| format!("bad index block in {}", path.display()))?;
        let summary: BloomSummary = serde_json::from_str(lines[1])
            .with_context(|| format!("bad bloom block in {}", path.display()))?;
        let bloom = BloomFilter::from_summary(&summary)?;

        for pair in index.windows(2) {
            ensure!(
                pair[0].key < pair[1].key && pair[0].offset < pair[1].offset,
                "sparse index out of order in {}",
                path.display()
            );
        }
        if let Some(last) = index.last() {
            ensure!(
                last.offset < index_offset,
                "sparse index points past data region in {}",
                path.display()
            );
        }

        Ok(Self {
            path,
            index,
            bloom,
            index_offset,
        })
    }

    /// Returns `false` only if the key is definitely not in this table.
    #[must_use]
    pub fn may_contain(&self, key: &str) -> bool {
        self.bloom.may_contain(key)
    }

    /// Point lookup for a single key.
    ///
    /// Binary-searches the sparse index for the last entry whose key is
    /// `<= key`, then scans forward from its offset. The scan is bounded by
    /// the next sparse entry's offset (or the end of the data region), since
    /// the key cannot lie beyond it, and stops early once a larger key is
    /// seen. Reads go through a [`READ_WINDOW_BYTES`] buffer.
    ///
    /// Returns the stored entry, which may be a tombstone.
    pub fn get(&self, key: &str) -> Result<Option<ValueEntry>> {
        let pos = self.index.partition_point(|e| e.key.as_str() <= key);
        if pos == 0 {
            // smaller than the first key in the table
            return Ok(None);
        }
        let start = self.index[pos - 1].offset;
        let end = self
            .index
            .get(pos)
            .map_or(self.index_offset, |e| e.offset);

        let mut f = File::open(&self.path)
            .with_context(|| format!("failed to open sstable {}", self.path.display()))?;
        f.seek(SeekFrom::Start(start))?;
        let window = BufReader::with_capacity(READ_WINDOW_BYTES, f.take(end - start));

        for line in window.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let rec: DataLine = serde_json::from_str(&line)
                .with_context(|| format!("corrupt data line in {}", self.path.display()))?;
            match rec.k.as_str().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(rec.v)),
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Less => {}
            }
        }
        Ok(None)
    }

    /// Sequential scan of the data region, returning records with
    /// `start <= key <= end` in ascending order. Tombstones are included.
    pub fn range(&self, start: &str, end: &str) -> Result<Vec<(String, ValueEntry)>> {
        let mut out = Vec::new();
        if start > end {
            return Ok(out);
        }
        self.scan(|k, v| {
            if k.as_str() > end {
                return false;
            }
            if k.as_str() >= start {
                out.push((k, v));
            }
            true
        })?;
        Ok(out)
    }

    /// Every record in the table, ascending.
    pub fn entries(&self) -> Result<Vec<(String, ValueEntry)>> {
        let mut out = Vec::new();
        self.scan(|k, v| {
            out.push((k, v));
            true
        })?;
        Ok(out)
    }

    /// Feeds data lines to `visit` until it returns `false` or the data
    /// region ends.
    fn scan<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(String, ValueEntry) -> bool,
    {
        let f = File::open(&self.path)
            .with_context(|| format!("failed to open sstable {}", self.path.display()))?;
        let data = BufReader::with_capacity(READ_WINDOW_BYTES, f.take(self.index_offset));
        for line in data.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let rec: DataLine = serde_json::from_str(&line)
                .with_context(|| format!("corrupt data line in {}", self.path.display()))?;
            if !visit(rec.k, rec.v) {
                break;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The sparse index as loaded from disk.
    #[must_use]
    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("path", &self.path)
            .field("index_entries", &self.index.len())
            .field("data_len", &self.index_offset)
            .finish()
    }
}

/// Reads the last line of the file and parses it as the footer.
fn read_footer(f: &mut File, filesize: u64) -> Result<Footer> {
    let window = filesize.min(FOOTER_TAIL_BYTES);
    if window < 2 {
        bail!("file too small for SSTable footer");
    }
    f.seek(SeekFrom::Start(filesize - window))?;
    let mut tail = Vec::with_capacity(window as usize);
    f.take(window).read_to_end(&mut tail)?;

    if tail.last() != Some(&b'\n') {
        bail!("footer line is not newline-terminated");
    }
    let body = &tail[..tail.len() - 1];
    let line_start = match body.iter().rposition(|&b| b == b'\n') {
        Some(p) => p + 1,
        None if window == filesize => 0,
        None => bail!("footer line longer than {} bytes", FOOTER_TAIL_BYTES),
    };
    Ok(serde_json::from_slice(&body[line_start..])?)
}
