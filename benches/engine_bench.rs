//! Benchmarks for RingKV engine operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ringkv::{Config, EngineRace};
use tempfile::TempDir;

fn open_engine(dir: &TempDir) -> EngineRace {
    let config = Config::builder().data_dir(dir.path()).build();
    EngineRace::open(config).unwrap()
}

fn engine_benchmarks(c: &mut Criterion) {
    let value = vec![0xABu8; 4096];

    c.bench_function("write_4k_distinct_keys", |b| {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            engine.write(format!("key-{}", n).as_bytes(), &value).unwrap();
        });
    });

    c.bench_function("overwrite_4k_same_key", |b| {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        b.iter(|| engine.write(b"hot", &value).unwrap());
    });

    c.bench_function("read_4k", |b| {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        for n in 0..1000 {
            engine.write(format!("key-{}", n).as_bytes(), &value).unwrap();
        }
        let mut n = 0u64;
        b.iter(|| {
            n = (n + 1) % 1000;
            engine.read(format!("key-{}", n).as_bytes()).unwrap()
        });
    });

    c.bench_function("open_existing", |b| {
        let dir = TempDir::new().unwrap();
        {
            let engine = open_engine(&dir);
            for n in 0..1000 {
                engine.write(format!("key-{}", n).as_bytes(), &value).unwrap();
            }
            engine.close().unwrap();
        }
        b.iter_batched(|| (), |()| open_engine(&dir), BatchSize::PerIteration);
    });
}

criterion_group!(benches, engine_benchmarks);
criterion_main!(benches);
