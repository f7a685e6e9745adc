/// Follower ingestion: records received from a leader.
///
/// These go straight to the WAL and Memtable. They are not replicated again
/// (no loops between nodes) and skip the inflight-byte check, so a follower
/// never refuses what its leader already accepted.
use wal::WalRecord;

use crate::write::validate_key;
use crate::{Engine, Result};

impl Engine {
    /// Logs and applies one replicated record.
    pub fn apply_replica_record(&mut self, rec: &WalRecord) -> Result<()> {
        validate_key(rec.key())?;
        self.commit(rec)
    }

    /// Logs a replicated batch as one fsynced unit and applies it in order.
    pub fn apply_replica_batch(&mut self, recs: &[WalRecord]) -> Result<()> {
        for rec in recs {
            validate_key(rec.key())?;
        }
        self.commit_batch(recs)
    }
}
