use super::helpers::{count_sst_files, open_engine, open_flushing};
use crate::*;
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

// --------------------- Recovery ---------------------

#[test]
fn recovery_from_wal() -> Result<()> {
    let dir = tempdir()?;

    // Write some data, then drop engine (simulates restart)
    {
        let mut engine = open_engine(dir.path());
        engine.put("a", "1")?;
        engine.put("b", "2")?;
        engine.delete("a")?;
    }

    let engine = open_engine(dir.path());
    assert!(engine.read("a")?.is_none());
    assert_eq!(engine.read("b")?.as_deref(), Some("2"));
    assert_eq!(engine.memtable_len(), 2);
    Ok(())
}

#[test]
fn recovery_from_sstables() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut engine = open_flushing(dir.path(), 1);
        engine.put("k", "v")?;
    }

    let engine = open_engine(dir.path());
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(engine.read("k")?.as_deref(), Some("v"));
    Ok(())
}

#[test]
fn recovery_combines_wal_and_sstables() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut engine = open_engine(dir.path());
        engine.put("disk", "1")?;
        engine.put("shadowed", "old")?;
        engine.force_flush()?;
        engine.put("wal", "2")?;
        engine.put("shadowed", "new")?;
    }

    let engine = open_engine(dir.path());
    assert_eq!(engine.read("disk")?.as_deref(), Some("1"));
    assert_eq!(engine.read("wal")?.as_deref(), Some("2"));
    assert_eq!(engine.read("shadowed")?.as_deref(), Some("new"));
    Ok(())
}

#[test]
fn delete_survives_restart_over_disk_value() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut engine = open_engine(dir.path());
        engine.put("k", "v")?;
        engine.force_flush()?;
        engine.delete("k")?;
    }

    let engine = open_engine(dir.path());
    assert!(engine.read("k")?.is_none());
    Ok(())
}

#[test]
fn flush_then_restart_reproduces_reads() -> Result<()> {
    let dir = tempdir()?;
    let keys: Vec<String> = (0..200).map(|i| format!("key{:03}", i)).collect();

    let before: Vec<Option<String>> = {
        let mut engine = open_flushing(dir.path(), 2 * 1024);
        for (i, k) in keys.iter().enumerate() {
            if i % 7 == 0 {
                engine.delete(k.clone())?;
            } else {
                engine.put(k.clone(), format!("v{}", i))?;
            }
        }
        engine.force_flush()?;
        let reads = keys
            .iter()
            .map(|k| engine.read(k))
            .collect::<crate::Result<_>>()?;
        reads
    };

    let engine = open_engine(dir.path());
    let after: Vec<Option<String>> = keys
        .iter()
        .map(|k| engine.read(k))
        .collect::<crate::Result<_>>()?;
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn unflushed_wal_buffer_is_written_on_drop() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut engine = open_engine(dir.path());
        engine.put("buffered", "yes")?;
        assert!(engine.wal().buffered_records() > 0);
    }
    let engine = open_engine(dir.path());
    assert_eq!(engine.read("buffered")?.as_deref(), Some("yes"));
    Ok(())
}

#[test]
fn table_order_survives_restart() -> Result<()> {
    let dir = tempdir()?;
    let paths = {
        let mut engine = open_flushing(dir.path(), 1);
        engine.put("k", "1")?;
        engine.put("k", "2")?;
        engine.put("k", "3")?;
        engine.sstable_paths()
    };

    let engine = open_engine(dir.path());
    assert_eq!(engine.sstable_paths(), paths);
    assert_eq!(engine.read("k")?.as_deref(), Some("3"));
    Ok(())
}

#[test]
fn new_tables_after_restart_are_newer() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut engine = open_flushing(dir.path(), 1);
        engine.put("k", "before")?;
    }
    let mut engine = open_flushing(dir.path(), 1);
    engine.put("k", "after")?;
    assert_eq!(engine.sstable_count(), 2);
    assert_eq!(engine.read("k")?.as_deref(), Some("after"));
    Ok(())
}

#[test]
fn temp_files_are_removed_on_open() -> Result<()> {
    let dir = tempdir()?;
    let sst_dir = dir.path().join("sst");
    fs::create_dir_all(&sst_dir)?;
    let tmp = sst_dir.join(sstable::temp_file_name(&sstable::table_file_name(1, false)));
    fs::write(&tmp, b"partial")?;

    let engine = open_engine(dir.path());
    assert!(!tmp.exists());
    assert_eq!(engine.sstable_count(), 0);
    Ok(())
}

#[test]
fn corrupt_table_is_skipped() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut engine = open_engine(dir.path());
        engine.put("good", "1")?;
        engine.force_flush()?;
    }
    let bad = dir.path().join("sst").join(sstable::table_file_name(1, false));
    fs::write(&bad, b"not an sstable\n")?;
    assert_eq!(count_sst_files(dir.path()), 2);

    let engine = open_engine(dir.path());
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.read("good")?.as_deref(), Some("1"));
    Ok(())
}

#[test]
fn unrelated_files_are_ignored() -> Result<()> {
    let dir = tempdir()?;
    let sst_dir = dir.path().join("sst");
    fs::create_dir_all(&sst_dir)?;
    fs::write(sst_dir.join("notes.txt"), b"hello")?;
    fs::write(sst_dir.join("sst-abc.sst"), b"junk")?;

    let engine = open_engine(dir.path());
    assert_eq!(engine.sstable_count(), 0);
    Ok(())
}

#[test]
fn from_config_uses_data_layout() -> Result<()> {
    let dir = tempdir()?;
    let cfg = config::Config {
        data_dir: dir.path().to_path_buf(),
        ..config::Config::default()
    };
    {
        let mut engine = Engine::from_config(&cfg)?;
        engine.put("k", "v")?;
        engine.force_flush()?;
    }
    assert!(cfg.wal_dir().is_dir());
    assert!(cfg.sst_dir().is_dir());

    let engine = Engine::from_config(&cfg)?;
    assert_eq!(engine.read("k")?.as_deref(), Some("v"));
    Ok(())
}
