///! # Bloom Filter
///!
///! A fixed-size probabilistic membership filter. It can tell you with
///! certainty that a key is **not** in the set (no false negatives), but may
///! occasionally report that a key **is** in the set when it isn't.
///!
///! ## Usage in SiltKV
///!
///! Every SSTable carries a bloom filter built over its keys, persisted as one
///! line of the table file. During point lookups the engine checks the filter
///! first -- if it says "not present", the table is skipped without touching
///! the data region.
///!
///! ## Example
///!
///! ```rust,no_run
///! use bloom::BloomFilter;
///!
///! let mut bf = BloomFilter::default();
///! bf.insert("hello");
///! assert!(bf.may_contain("hello"));
///!
///! let restored = BloomFilter::from_summary(&bf.summary()).unwrap();
///! assert!(restored.may_contain("hello"));
///! ```
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::io;

/// Default filter width in bits.
pub const DEFAULT_NUM_BITS: u64 = 8 * 1024;

/// Default number of hash functions per key.
pub const DEFAULT_NUM_HASHES: u32 = 3;

/// A bloom filter backed by a bit vector with `k` bit positions per key.
///
/// Uses double hashing: `pos(i) = (h1 + i * h2) mod m`, where `h1` is a
/// 32-bit FNV-1a hash and `h2` a DJB2 hash of the key, both folded to their
/// absolute value.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

/// Persisted form of a [`BloomFilter`]: the raw bit array (base64) plus `m`
/// and `k`, enough to rebuild the filter without rescanning the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomSummary {
    /// Base64 of the raw bit array.
    pub bloom: String,
    /// Number of bits.
    pub m: u64,
    /// Number of hash functions.
    pub k: u32,
}

impl BloomFilter {
    /// Creates an empty filter with `num_bits` bits and `num_hashes` hash functions.
    ///
    /// # Panics
    ///
    /// Panics if either argument is 0.
    pub fn new(num_bits: u64, num_hashes: u32) -> Self {
        assert!(num_bits > 0, "num_bits must be > 0");
        assert!(num_hashes > 0, "num_hashes must be > 0");

        let byte_len = num_bits.div_ceil(8) as usize;
        Self {
            bits: vec![0u8; byte_len],
            num_bits,
            num_hashes,
        }
    }

    /// Sets the `k` bit positions for `key`.
    pub fn insert(&mut self, key: &str) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let bit_idx = self.bit_index(h1, h2, i);
            self.set_bit(bit_idx);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn may_contain(&self, key: &str) -> bool {
        let (h1, h2) = hash_pair(key);
        (0..self.num_hashes).all(|i| self.get_bit(self.bit_index(h1, h2, i)))
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Returns the number of hash functions per key.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Encodes the filter for persistence.
    #[must_use]
    pub fn summary(&self) -> BloomSummary {
        BloomSummary {
            bloom: STANDARD.encode(&self.bits),
            m: self.num_bits,
            k: self.num_hashes,
        }
    }

    /// Rebuilds a filter from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the base64 is malformed, `m` or `k` is zero,
    /// or the decoded bit array does not match `m`.
    pub fn from_summary(summary: &BloomSummary) -> io::Result<Self> {
        if summary.m == 0 || summary.k == 0 {
            return Err(invalid("bloom filter with zero bits or zero hashes"));
        }

        // Safety cap: bloom filter should not exceed 128 MiB
        const MAX_BLOOM_BYTES: u64 = 128 * 1024 * 1024;
        let byte_len = summary.m.div_ceil(8);
        if byte_len > MAX_BLOOM_BYTES {
            return Err(invalid(format!("bloom filter too large: {} bytes", byte_len)));
        }

        let bits = STANDARD
            .decode(summary.bloom.as_bytes())
            .map_err(|e| invalid(format!("bloom filter is not valid base64: {}", e)))?;
        if bits.len() as u64 != byte_len {
            return Err(invalid(format!(
                "bloom filter holds {} bytes, expected {} for m={}",
                bits.len(),
                byte_len,
                summary.m
            )));
        }

        Ok(Self {
            bits,
            num_bits: summary.m,
            num_hashes: summary.k,
        })
    }

    // ---- Internal helpers ----

    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_BITS, DEFAULT_NUM_HASHES)
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

fn invalid<E>(msg: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn hash_pair(key: &str) -> (u64, u64) {
    let bytes = key.as_bytes();
    (fnv1a_32(bytes) as u64, djb2(bytes) as u64)
}

/// FNV-1a, 32-bit, folded to the absolute value of its signed form.
fn fnv1a_32(data: &[u8]) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = FNV_OFFSET;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash as i32).unsigned_abs()
}

/// DJB2 (`h * 33 + c`), folded to the absolute value of its signed form.
fn djb2(data: &[u8]) -> u32 {
    let mut hash: i32 = 5381;
    for &byte in data {
        hash = hash
            .wrapping_shl(5)
            .wrapping_add(hash)
            .wrapping_add(byte as i32);
    }
    hash.unsigned_abs()
}

#[cfg(test)]
mod tests;
