//! SSTable line formats, constants and file naming.
//!
//! Table files are named `sst-<id>.sst` for flush output and
//! `sst-<id>-cmp.sst` for compaction output, where `<id>` is a zero-padded,
//! strictly increasing number. Lexical filename order is recency order.
//! In-progress writes use `.tmp-<final name>`.

use memtable::ValueEntry;
use serde::{Deserialize, Serialize};

/// Magic marker stored in the footer line.
pub const SSTABLE_MAGIC: &str = "SSTABLEv1";

/// One sparse index entry is recorded every this many data records.
pub const DEFAULT_INDEX_INTERVAL: usize = 32;

/// Buffer size used when scanning the data region during a point lookup.
pub const READ_WINDOW_BYTES: usize = 64 * 1024;

/// File extension of table files.
pub const TABLE_EXT: &str = "sst";

const TABLE_PREFIX: &str = "sst-";
const COMPACTED_SUFFIX: &str = "-cmp";
const TEMP_PREFIX: &str = ".tmp-";

/// Data line as written.
#[derive(Serialize)]
pub(crate) struct DataLineRef<'a> {
    pub k: &'a str,
    pub v: &'a ValueEntry,
}

/// Data line as read back.
#[derive(Deserialize)]
pub(crate) struct DataLine {
    pub k: String,
    pub v: ValueEntry,
}

/// Sparse index entry: a key and the byte offset of its data line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub offset: u64,
}

/// Footer line: `{"magic":"SSTABLEv1","indexOffset":N}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Footer {
    pub magic: String,
    #[serde(rename = "indexOffset")]
    pub index_offset: u64,
}

/// `sst-<id>.sst`, or `sst-<id>-cmp.sst` for compaction output.
#[must_use]
pub fn table_file_name(id: u64, compacted: bool) -> String {
    let suffix = if compacted { COMPACTED_SUFFIX } else { "" };
    format!("{}{:020}{}.{}", TABLE_PREFIX, id, suffix, TABLE_EXT)
}

/// Name of the temporary file a table is written to before being renamed.
#[must_use]
pub fn temp_file_name(final_name: &str) -> String {
    format!("{}{}", TEMP_PREFIX, final_name)
}

/// Parses a table file name into `(id, compacted)`. Returns `None` for
/// temporary files and anything else that is not a table.
#[must_use]
pub fn parse_table_file_name(name: &str) -> Option<(u64, bool)> {
    let stem = name.strip_prefix(TABLE_PREFIX)?.strip_suffix(".sst")?;
    let (digits, compacted) = match stem.strip_suffix(COMPACTED_SUFFIX) {
        Some(d) => (d, true),
        None => (stem, false),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|id| (id, compacted))
}
