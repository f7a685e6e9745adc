use async_trait::async_trait;
use wal::WalRecord;

/// Propagates committed write records to peer nodes.
///
/// Implementations decide how long to wait (fire-and-forget or quorum) but
/// never fail the write: a shortfall is the implementation's to log.
#[async_trait]
pub trait Replicate: Send + Sync {
    async fn replicate(&self, record: &WalRecord);

    async fn replicate_batch(&self, records: &[WalRecord]);
}

/// Single-node setup: nothing to send.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReplication;

#[async_trait]
impl Replicate for NoReplication {
    async fn replicate(&self, _record: &WalRecord) {}

    async fn replicate_batch(&self, _records: &[WalRecord]) {}
}
