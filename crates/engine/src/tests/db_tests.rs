use super::helpers::open_engine;
use crate::*;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

/// Records what would have been sent to peers.
#[derive(Default)]
struct Recorder {
    single: Mutex<Vec<WalRecord>>,
    batches: Mutex<Vec<Vec<WalRecord>>>,
}

#[async_trait]
impl Replicate for Recorder {
    async fn replicate(&self, record: &WalRecord) {
        self.single.lock().unwrap().push(record.clone());
    }

    async fn replicate_batch(&self, records: &[WalRecord]) {
        self.batches.lock().unwrap().push(records.to_vec());
    }
}

fn db_with_recorder(dir: &std::path::Path) -> (Db, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let db = Db::new(open_engine(dir), recorder.clone());
    (db, recorder)
}

#[tokio::test]
async fn put_read_delete_through_db() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::new(open_engine(dir.path()), Arc::new(NoReplication));

    db.put("k".into(), "v".into()).await?;
    assert_eq!(db.read("k").await?.as_deref(), Some("v"));

    db.delete("k".into()).await?;
    assert!(db.read("k").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn writes_are_replicated_before_commit() -> Result<()> {
    let dir = tempdir()?;
    let (db, recorder) = db_with_recorder(dir.path());

    db.put("a".into(), "1".into()).await?;
    db.delete("a".into()).await?;

    let sent = recorder.single.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert!(matches!(&sent[0], WalRecord::Put { key, value, .. } if key == "a" && value == "1"));
    assert!(matches!(&sent[1], WalRecord::Del { key, .. } if key == "a"));
    Ok(())
}

#[tokio::test]
async fn batch_is_replicated_as_one_unit() -> Result<()> {
    let dir = tempdir()?;
    let (db, recorder) = db_with_recorder(dir.path());

    db.batch_put(vec![("c".into(), "3".into()), ("d".into(), "4".into())])
        .await?;

    let batches = recorder.batches.lock().unwrap().clone();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert_eq!(
        db.read_range("c", "d").await?,
        vec![("c".to_string(), "3".to_string()), ("d".to_string(), "4".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn rejected_writes_are_not_replicated() -> Result<()> {
    let dir = tempdir()?;
    let (db, recorder) = db_with_recorder(dir.path());

    assert!(matches!(
        db.put(String::new(), "v".into()).await,
        Err(EngineError::Validation(_))
    ));
    db.batch_put(Vec::new()).await?;

    db.lock().await.set_max_inflight_bytes(1);
    db.put("first".into(), "ok".into()).await?;
    assert!(matches!(
        db.put("second".into(), "no".into()).await,
        Err(EngineError::Overloaded)
    ));

    assert_eq!(recorder.single.lock().unwrap().len(), 1);
    assert!(recorder.batches.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn replica_ingestion_is_not_replicated_again() -> Result<()> {
    let dir = tempdir()?;
    let (db, recorder) = db_with_recorder(dir.path());

    db.apply_replica_record(&WalRecord::put("r", "1")).await?;
    db.apply_replica_batch(&[WalRecord::put("s", "2")]).await?;

    assert_eq!(db.read("r").await?.as_deref(), Some("1"));
    assert_eq!(db.read("s").await?.as_deref(), Some("2"));
    assert!(recorder.single.lock().unwrap().is_empty());
    assert!(recorder.batches.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_all_land() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::new(open_engine(dir.path()), Arc::new(NoReplication));

    let mut handles = Vec::new();
    for t in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..50 {
                db.put(format!("t{}-k{:02}", t, i), format!("{}", i)).await?;
            }
            Ok::<_, EngineError>(())
        }));
    }
    for h in handles {
        h.await??;
    }

    assert_eq!(db.read_range("t", "u").await?.len(), 400);
    assert_eq!(db.read("t7-k49").await?.as_deref(), Some("49"));
    Ok(())
}

#[tokio::test]
async fn flush_wal_drains_buffer() -> Result<()> {
    let dir = tempdir()?;
    let db = Db::new(open_engine(dir.path()), Arc::new(NoReplication));

    db.put("k".into(), "v".into()).await?;
    assert!(db.lock().await.wal().buffered_bytes() > 0);
    db.flush_wal().await?;
    assert_eq!(db.lock().await.wal().buffered_bytes(), 0);
    Ok(())
}

#[tokio::test]
async fn engine_work_runs_off_the_runtime_thread() -> Result<()> {
    let dir = tempdir()?;
    let (db, _) = db_with_recorder(dir.path());

    let caller = std::thread::current().id();
    let worker = db.run_blocking(|_| Ok(std::thread::current().id())).await?;
    assert_ne!(worker, caller);

    db.put("k".into(), "v".into()).await?;
    assert_eq!(db.read("k").await?.as_deref(), Some("v"));
    Ok(())
}

#[tokio::test]
async fn abandoned_request_still_releases_the_engine() -> Result<()> {
    let dir = tempdir()?;
    let (db, _) = db_with_recorder(dir.path());

    let pending = db.run_blocking(|engine| {
        std::thread::sleep(std::time::Duration::from_millis(50));
        engine.put("slow", "done")
    });
    // polled once so the blocking task starts, then dropped
    let _ = tokio::time::timeout(std::time::Duration::from_millis(1), pending).await;

    assert_eq!(db.read("slow").await?.as_deref(), Some("done"));
    Ok(())
}
