//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk storage files for the SiltKV storage engine.
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold the
//! engine flushes it to disk as an SSTable. SSTables are *write-once,
//! read-many*: once created they are never modified (only replaced during
//! compaction).
//!
//! ## File layout
//!
//! Every section is one or more newline-terminated JSON lines:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (one line per record, strictly ascending keys)   │
//! │   {"k":"apple","v":{"value":"red","tombstone":false}}         │
//! │   {"k":"kiwi","v":{"value":null,"tombstone":true}}            │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX LINE (sparse: every 32nd record)                         │
//! │   [{"key":"apple","offset":0}, ...]                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM LINE                                                     │
//! │   {"bloom":"<base64 bits>","m":8192,"k":3}                    │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER LINE                                                    │
//! │   {"magic":"SSTABLEv1","indexOffset":<byte offset of index>}  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Offsets are byte offsets from the start of the file. Loading a table
//! ([`SSTableReader::open`]) reads only the footer, index and bloom lines.

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{
    parse_table_file_name, table_file_name, temp_file_name, IndexEntry, DEFAULT_INDEX_INTERVAL,
    READ_WINDOW_BYTES, SSTABLE_MAGIC, TABLE_EXT,
};
pub use merge::merge;
pub use reader::SSTableReader;
pub use writer::{publish, SSTableWriter};

#[cfg(test)]
mod tests;
