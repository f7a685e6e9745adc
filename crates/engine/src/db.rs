use config::Config;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task;
use wal::WalRecord;

use crate::{Engine, EngineError, Replicate, Result};

/// Cloneable handle shared by request handlers and background tasks.
///
/// Writes are validated and admitted under the engine lock, replicated with
/// the lock released, then logged and applied under the lock again. Writes
/// from concurrent callers may therefore interleave at the replication step;
/// the last one to commit wins.
#[derive(Clone)]
pub struct Db {
    engine: Arc<Mutex<Engine>>,
    replicator: Arc<dyn Replicate>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

impl Db {
    pub fn new(engine: Engine, replicator: Arc<dyn Replicate>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            replicator,
        }
    }

    /// Opens the engine described by `cfg`.
    pub fn open(cfg: &Config, replicator: Arc<dyn Replicate>) -> Result<Self> {
        Ok(Self::new(Engine::from_config(cfg)?, replicator))
    }

    /// Exclusive access to the engine.
    pub async fn lock(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().await
    }

    /// Runs `f` against the engine on tokio's blocking pool.
    ///
    /// Engine calls touch the disk (WAL appends and fsyncs, SSTable reads,
    /// flushes, compaction) and must not stall an async worker thread. The
    /// lock is held for the whole call and released when `f` returns, even if
    /// the awaiting caller has gone away.
    pub(crate) async fn run_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Engine) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut engine = self.engine.clone().lock_owned().await;
        task::spawn_blocking(move || f(&mut *engine))
            .await
            .map_err(|e| EngineError::Storage(anyhow::Error::new(e).context("engine task failed")))?
    }

    pub async fn put(&self, key: String, value: String) -> Result<()> {
        let rec = self.engine.lock().await.prepare_put(key, value)?;
        self.replicator.replicate(&rec).await;
        self.run_blocking(move |engine| engine.commit(&rec)).await
    }

    pub async fn delete(&self, key: String) -> Result<()> {
        let rec = self.engine.lock().await.prepare_delete(key)?;
        self.replicator.replicate(&rec).await;
        self.run_blocking(move |engine| engine.commit(&rec)).await
    }

    /// An empty batch is a no-op and is not replicated.
    pub async fn batch_put(&self, items: Vec<(String, String)>) -> Result<()> {
        let recs = self.engine.lock().await.prepare_batch(items)?;
        if recs.is_empty() {
            return Ok(());
        }
        self.replicator.replicate_batch(&recs).await;
        self.run_blocking(move |engine| engine.commit_batch(&recs)).await
    }

    pub async fn read(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_owned();
        self.run_blocking(move |engine| engine.read(&key)).await
    }

    pub async fn read_range(&self, start: &str, end: &str) -> Result<Vec<(String, String)>> {
        let (start, end) = (start.to_owned(), end.to_owned());
        self.run_blocking(move |engine| engine.read_range(&start, &end)).await
    }

    pub async fn apply_replica_record(&self, rec: &WalRecord) -> Result<()> {
        let rec = rec.clone();
        self.run_blocking(move |engine| engine.apply_replica_record(&rec)).await
    }

    pub async fn apply_replica_batch(&self, recs: &[WalRecord]) -> Result<()> {
        let recs = recs.to_vec();
        self.run_blocking(move |engine| engine.apply_replica_batch(&recs)).await
    }

    pub async fn flush_wal(&self) -> Result<()> {
        self.run_blocking(|engine| engine.flush_wal()).await
    }
}
