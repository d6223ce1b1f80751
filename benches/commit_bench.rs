//! Benchmarks for crosskv commit and read paths

use criterion::{criterion_group, criterion_main, Criterion};

use crosskv::{StoreConfig, StoreRegistry};
use tempfile::TempDir;

fn commit_benchmarks(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig::builder().data_dir(temp.path()).build();
    let registry = StoreRegistry::new(config).unwrap();
    let store = registry.open("bench").unwrap();

    let mut counter = 0u32;
    c.bench_function("commit_single_key", |b| {
        b.iter(|| {
            counter = counter.wrapping_add(1);
            let mut editor = store.edit();
            editor.put_int("hot_key", counter as i32);
            editor.commit()
        })
    });

    let mut editor = store.edit();
    for i in 0..100 {
        editor.put_int(format!("warm_{i}"), i);
    }
    editor.commit();

    c.bench_function("get_int_hit", |b| b.iter(|| store.get_int("warm_42", 0)));

    c.bench_function("get_all_100_keys", |b| b.iter(|| store.get_all()));

    registry.shutdown();
}

criterion_group!(benches, commit_benchmarks);
criterion_main!(benches);
