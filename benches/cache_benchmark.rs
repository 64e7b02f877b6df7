use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Runtime;

use fieldcache::{CacheOptions, CacheStore, CacheStoreConfig, MemoryBackend};

#[derive(Clone, Serialize, Deserialize)]
struct BenchReport {
    id: String,
    title: String,
    sections: Vec<String>,
}

fn report(id: usize, section_count: usize) -> BenchReport {
    BenchReport {
        id: format!("report-{id}"),
        title: "Rapid needs assessment, district overview".to_string(),
        sections: vec!["shelter, food security and access constraints".to_string(); section_count],
    }
}

fn store() -> CacheStore {
    CacheStore::new(Arc::new(MemoryBackend::new()), CacheStoreConfig::default())
}

/// Read performance against a warm cache, plain vs compressed payloads.
fn bench_hot_get(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("hot_get");

    let plain_store = store();
    rt.block_on(async {
        for i in 0..1000 {
            plain_store
                .set(
                    "reports",
                    &format!("report-{i}"),
                    &report(i, 2),
                    &CacheOptions::default(),
                    None,
                )
                .await;
        }
    });
    group.bench_function("plain", |b| {
        b.to_async(&rt).iter(|| async {
            for i in 0..100 {
                let cached: Option<BenchReport> = plain_store
                    .get("reports", &format!("report-{i}"), None)
                    .await;
                black_box(cached);
            }
        });
    });

    let compressed_store = store();
    let options = CacheOptions {
        compress: true,
        ..Default::default()
    };
    rt.block_on(async {
        for i in 0..1000 {
            compressed_store
                .set(
                    "reports",
                    &format!("report-{i}"),
                    &report(i, 40),
                    &options,
                    None,
                )
                .await;
        }
    });
    group.bench_function("compressed", |b| {
        b.to_async(&rt).iter(|| async {
            for i in 0..100 {
                let cached: Option<BenchReport> = compressed_store
                    .get("reports", &format!("report-{i}"), None)
                    .await;
                black_box(cached);
            }
        });
    });

    group.finish();
}

/// Write performance including tag registration.
fn bench_set(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("set");

    let untagged = CacheOptions::default();
    let tagged = CacheOptions {
        tags: vec!["reports".to_string(), "lists".to_string()],
        ..Default::default()
    };

    for (name, options) in [("untagged", &untagged), ("tagged", &tagged)] {
        let cache = store();
        group.bench_function(name, |b| {
            b.to_async(&rt).iter(|| async {
                for i in 0..100 {
                    black_box(
                        cache
                            .set("reports", &format!("report-{i}"), &report(i, 2), options, None)
                            .await,
                    );
                }
            });
        });
    }

    group.finish();
}

/// Tag invalidation cost as the member count grows.
fn bench_invalidate_by_tags(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("invalidate_by_tags");
    group.sample_size(20);

    for members in [10usize, 100, 1000] {
        group.bench_function(format!("{members}_members"), |b| {
            b.to_async(&rt).iter_batched(
                || {
                    let cache = store();
                    let options = CacheOptions {
                        tags: vec!["reports".to_string()],
                        ..Default::default()
                    };
                    // The in-memory backend only awaits runtime-agnostic
                    // locks, so a plain executor can populate it from the
                    // setup closure.
                    futures::executor::block_on(async {
                        for i in 0..members {
                            cache
                                .set(
                                    "reports",
                                    &format!("report-{i}"),
                                    &report(i, 2),
                                    &options,
                                    None,
                                )
                                .await;
                        }
                    });
                    cache
                },
                |cache| async move {
                    black_box(cache.invalidate_by_tags(&["reports"]).await);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn run_benchmarks(c: &mut Criterion) {
    bench_hot_get(c);
    bench_set(c);
    bench_invalidate_by_tags(c);
}

criterion_group!(benches, run_benchmarks);
criterion_main!(benches);
