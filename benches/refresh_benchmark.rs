//! Performance benchmarks for refresh-kit
//!
//! This benchmark suite measures:
//! - RefreshCache hits, refreshes and concurrent joins
//! - TtlCache hits inside the fresh window
//! - Snapshot encode/decode across entry counts
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use refresh_kit::serialization::Snapshot;
use refresh_kit::{Expiring, RefreshCache, RefreshConfig, TtlCache};
use std::hint::black_box;
use std::time::Duration;

// ============================================================================
// Group 1: RefreshCache Benchmarks
// ============================================================================

fn refresh_cache_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_cache");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    // Serve path: the cache holds a value different from the hint
    group.bench_function("hit", |b| {
        let cache: RefreshCache<u64, u64, String> = RefreshCache::new();
        rt.block_on(async {
            cache
                .get(1, None, || async { Ok(1) })
                .await
                .expect("Failed to seed");
        });

        b.to_async(&rt)
            .iter(|| async { cache.get(black_box(1), Some(&0), || async { Ok(2) }).await });
    });

    // Refresh path: every call hands back the current value
    group.bench_function("refresh", |b| {
        let cache: RefreshCache<u64, u64, String> = RefreshCache::new();

        b.to_async(&rt).iter(|| async {
            let current = cache.cached(&1).ok();
            cache
                .get(black_box(1), current.as_ref(), || async { Ok(1) })
                .await
        });
    });

    // Stale fallback path
    group.bench_function("stale_fallback", |b| {
        let cache: RefreshCache<u64, u64, String> = RefreshCache::new();
        rt.block_on(async {
            cache
                .get(1, None, || async { Ok(1) })
                .await
                .expect("Failed to seed");
        });

        b.to_async(&rt).iter(|| async {
            cache
                .get(black_box(1), Some(&1), || async { Err("down".to_string()) })
                .await
        });
    });

    // N callers joining one refresh
    for callers in [2usize, 16, 128].iter() {
        group.bench_with_input(
            BenchmarkId::new("concurrent_join", callers),
            callers,
            |b, &callers| {
                b.to_async(&rt).iter(|| async move {
                    let cache: RefreshCache<u64, u64, String> = RefreshCache::new();
                    let calls = (0..callers).map(|_| {
                        cache.get(1, None, || async {
                            tokio::task::yield_now().await;
                            Ok(1)
                        })
                    });
                    futures::future::join_all(calls).await
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Group 2: TtlCache Benchmarks
// ============================================================================

fn ttl_cache_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("ttl_cache");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    group.bench_function("fresh_hit", |b| {
        let cache: TtlCache<u64, u64, String> = TtlCache::new(
            |key: u64| async move { Ok(Expiring::new(key, Duration::from_secs(3600))) },
            RefreshConfig::default(),
        );
        rt.block_on(async {
            cache.get(1).await.expect("Failed to seed");
        });

        b.to_async(&rt).iter(|| async { cache.get(black_box(1)).await });
    });

    group.finish();
}

// ============================================================================
// Group 3: Snapshot Benchmarks
// ============================================================================

fn snapshot_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for entries in [10u64, 1_000, 10_000].iter() {
        let snapshot = Snapshot::from_entries((0..*entries).map(|i| (i, format!("value-{}", i))));

        group
            .throughput(Throughput::Elements(*entries))
            .bench_with_input(BenchmarkId::new("encode", entries), &snapshot, |b, snapshot| {
                b.iter(|| snapshot.to_bytes());
            });

        let bytes = snapshot.to_bytes().unwrap();
        group
            .throughput(Throughput::Elements(*entries))
            .bench_with_input(BenchmarkId::new("decode", entries), &bytes, |b, bytes| {
                b.iter(|| Snapshot::<u64, String>::from_bytes(black_box(bytes)));
            });
    }

    group.finish();
}

// ============================================================================
// Benchmark Registration
// ============================================================================

criterion_group!(
    benches,
    refresh_cache_benchmarks,
    ttl_cache_benchmarks,
    snapshot_benchmarks
);
criterion_main!(benches);
