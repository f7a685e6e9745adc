//! # Config - SiltKV runtime configuration
//!
//! Every knob is read from an environment-style key lookup with a default.
//! [`Config::from_env`] uses the process environment;
//! [`Config::from_lookup`] accepts any lookup closure, which keeps parsing
//! testable without mutating global state.
//!
//! | Variable                  | Default          |
//! |---------------------------|------------------|
//! | `DATA_DIR`                | `data`           |
//! | `MEMTABLE_MAX_BYTES`      | 4 MiB            |
//! | `MAX_INFLIGHT_BYTES`      | 32 MiB           |
//! | `WAL_BATCH_SIZE`          | 1000             |
//! | `WAL_FLUSH_INTERVAL_MS`   | 50               |
//! | `WAL_FSYNC_PER_APPEND`    | false            |
//! | `WAL_PRUNE_ON_FLUSH`      | true             |
//! | `REPLICATION_PEERS`       | (none)           |
//! | `REPLICATION_ACK`         | `ASYNC`          |
//! | `COMPACTION_TRIGGER`      | 4                |
//! | `MAINTENANCE_INTERVAL_MS` | 1000             |
//! | `IDLE_FLUSH_MS`           | 5000             |
//! | `LISTEN_ADDR`             | `127.0.0.1:3000` |
//!
//! Malformed values are reported as [`ConfigError`] instead of silently
//! falling back to the default.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MEMTABLE_MAX_BYTES: usize = 4 * 1024 * 1024;
pub const DEFAULT_MAX_INFLIGHT_BYTES: usize = 32 * 1024 * 1024;
pub const DEFAULT_WAL_BATCH_SIZE: usize = 1000;
pub const DEFAULT_WAL_FLUSH_INTERVAL_MS: u64 = 50;
pub const DEFAULT_COMPACTION_TRIGGER: usize = 4;
pub const DEFAULT_MAINTENANCE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_IDLE_FLUSH_MS: u64 = 5000;
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// How many peer acknowledgments a replicated write waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Fire-and-forget: the write returns before any peer answers.
    #[default]
    Async,
    /// Wait for every peer, then check for a majority including the leader.
    Majority,
}

impl FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASYNC" => Ok(AckMode::Async),
            "MAJORITY" => Ok(AckMode::Majority),
            other => Err(format!("expected ASYNC or MAJORITY, got {}", other)),
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckMode::Async => f.write_str("ASYNC"),
            AckMode::Majority => f.write_str("MAJORITY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------
    /// Root directory for all data files:
    ///   {data_dir}/
    ///     ├── wal/         (wal-<id>.wal segments)
    ///     └── sstables/    (sst-<id>.sst tables)
    pub data_dir: PathBuf,

    /// Memtable size that triggers a flush to a new SSTable.
    pub memtable_max_bytes: usize,

    /// Backpressure ceiling for memtable + buffered WAL bytes.
    pub max_inflight_bytes: usize,

    /// Number of tables above which background compaction runs.
    pub compaction_trigger: usize,

    // -------------------------------------------------------------------------
    // WAL
    // -------------------------------------------------------------------------
    pub wal_batch_size: usize,
    pub wal_flush_interval: Duration,
    pub wal_fsync_per_append: bool,
    /// Delete segments older than the active one after each memtable flush.
    pub wal_prune_on_flush: bool,

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------
    pub maintenance_interval: Duration,
    /// Flush a non-empty memtable once no write has arrived for this long.
    pub idle_flush_after: Duration,

    // -------------------------------------------------------------------------
    // Replication & network
    // -------------------------------------------------------------------------
    /// Base URLs of follower nodes, e.g. `http://10.0.0.2:3000`.
    pub replication_peers: Vec<String>,
    pub replication_ack: AckMode,
    pub listen_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            memtable_max_bytes: DEFAULT_MEMTABLE_MAX_BYTES,
            max_inflight_bytes: DEFAULT_MAX_INFLIGHT_BYTES,
            compaction_trigger: DEFAULT_COMPACTION_TRIGGER,
            wal_batch_size: DEFAULT_WAL_BATCH_SIZE,
            wal_flush_interval: Duration::from_millis(DEFAULT_WAL_FLUSH_INTERVAL_MS),
            wal_fsync_per_append: false,
            wal_prune_on_flush: true,
            maintenance_interval: Duration::from_millis(DEFAULT_MAINTENANCE_INTERVAL_MS),
            idle_flush_after: Duration::from_millis(DEFAULT_IDLE_FLUSH_MS),
            replication_peers: Vec::new(),
            replication_ack: AckMode::Async,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, using defaults for keys it
    /// does not return. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let d = Config::default();

        let cfg = Config {
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            memtable_max_bytes: parse_or(&get, "MEMTABLE_MAX_BYTES", d.memtable_max_bytes)?,
            max_inflight_bytes: parse_or(&get, "MAX_INFLIGHT_BYTES", d.max_inflight_bytes)?,
            compaction_trigger: parse_or(&get, "COMPACTION_TRIGGER", d.compaction_trigger)?,
            wal_batch_size: parse_or(&get, "WAL_BATCH_SIZE", d.wal_batch_size)?,
            wal_flush_interval: millis_or(&get, "WAL_FLUSH_INTERVAL_MS", d.wal_flush_interval)?,
            wal_fsync_per_append: bool_or(&get, "WAL_FSYNC_PER_APPEND", d.wal_fsync_per_append)?,
            wal_prune_on_flush: bool_or(&get, "WAL_PRUNE_ON_FLUSH", d.wal_prune_on_flush)?,
            maintenance_interval: millis_or(
                &get,
                "MAINTENANCE_INTERVAL_MS",
                d.maintenance_interval,
            )?,
            idle_flush_after: millis_or(&get, "IDLE_FLUSH_MS", d.idle_flush_after)?,
            replication_peers: get("REPLICATION_PEERS")
                .map(|v| parse_peers(&v))
                .unwrap_or(d.replication_peers),
            replication_ack: parse_or(&get, "REPLICATION_ACK", d.replication_ack)?,
            listen_addr: get("LISTEN_ADDR").unwrap_or(d.listen_addr),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// `{data_dir}/wal`
    #[must_use]
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    /// `{data_dir}/sstables`
    #[must_use]
    pub fn sst_dir(&self) -> PathBuf {
        self.data_dir.join("sstables")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("MEMTABLE_MAX_BYTES", self.memtable_max_bytes),
            ("MAX_INFLIGHT_BYTES", self.max_inflight_bytes),
            ("WAL_BATCH_SIZE", self.wal_batch_size),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                    reason: "must be > 0".into(),
                });
            }
        }
        for (key, d) in [
            ("WAL_FLUSH_INTERVAL_MS", self.wal_flush_interval),
            ("MAINTENANCE_INTERVAL_MS", self.maintenance_interval),
        ] {
            if d.is_zero() {
                return Err(ConfigError::Invalid {
                    key,
                    value: "0".into(),
                    reason: "interval must be > 0".into(),
                });
            }
        }
        Ok(())
    }
}

/// Splits a comma-separated peer list, dropping blanks and trailing slashes.
fn parse_peers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().trim_end_matches('/'))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn millis_or<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let ms: u64 = parse_or(get, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}

fn bool_or<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value: raw,
                reason: "expected a boolean".into(),
            }),
        },
    }
}
