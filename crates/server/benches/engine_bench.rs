use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::{Engine, EngineOptions};
use memtable::Memtable;
use sstable::{SSTableReader, SSTableWriter};
use std::path::Path;
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn value() -> String {
    "x".repeat(VALUE_SIZE)
}

fn open_engine(dir: &Path) -> Engine {
    Engine::open(dir.join("wal"), dir.join("sst"), EngineOptions::default()).unwrap()
}

fn build_memtable() -> Memtable {
    let mut mem = Memtable::new();
    for i in 0..N_KEYS {
        mem.put(format!("key{:05}", i), value());
    }
    mem
}

fn engine_put_benchmark(c: &mut Criterion) {
    c.bench_function("engine_put_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let engine = open_engine(dir.path());
                (dir, engine)
            },
            |(_dir, mut engine)| {
                for i in 0..N_KEYS {
                    engine.put(format!("key{:05}", i), value()).unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn engine_read_after_flush_benchmark(c: &mut Criterion) {
    c.bench_function("engine_read_sstable_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let mut engine = open_engine(dir.path());
                let items = (0..N_KEYS)
                    .map(|i| (format!("key{:05}", i), value()))
                    .collect();
                engine.batch_put(items).unwrap();
                engine.force_flush().unwrap();
                (dir, engine)
            },
            |(_dir, engine)| {
                for i in 0..N_KEYS {
                    assert!(engine.read(&format!("key{:05}", i)).unwrap().is_some());
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn sstable_get_hit_benchmark(c: &mut Criterion) {
    c.bench_function("sstable_get_hit_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sst");
                SSTableWriter::write(&path, &build_memtable().entries_sorted()).unwrap();
                let reader = SSTableReader::open(&path).unwrap();
                (dir, reader)
            },
            |(_dir, reader)| {
                for i in 0..N_KEYS {
                    assert!(reader.get(&format!("key{:05}", i)).unwrap().is_some());
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn sstable_get_miss_benchmark(c: &mut Criterion) {
    c.bench_function("sstable_get_miss_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sst");
                SSTableWriter::write(&path, &build_memtable().entries_sorted()).unwrap();
                let reader = SSTableReader::open(&path).unwrap();
                (dir, reader)
            },
            |(_dir, reader)| {
                for i in 0..N_KEYS {
                    // filtered by the bloom filter before touching the file
                    if reader.may_contain(&format!("missing{}", i)) {
                        assert!(reader.get(&format!("missing{}", i)).unwrap().is_none());
                    }
                }
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    engine_put_benchmark,
    engine_read_after_flush_benchmark,
    sstable_get_hit_benchmark,
    sstable_get_miss_benchmark
);
criterion_main!(benches);
