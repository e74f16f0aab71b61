//! Benchmarks for Stratus coverage and tiers
//!
//! Run with: cargo bench

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use stratus::clock::SystemClock;
use stratus::geo::GeoLocation;
use stratus::index::CoverageIndex;
use stratus::storage::segment::{read_snapshot, write_snapshot};
use stratus::storage::*;
use stratus::upstream::SyntheticUpstream;
use stratus::FactorId;
use tempfile::tempdir;

fn bench_key() -> GeoKey {
    GeoKey::new(GeoLocation::wgs84(5.18, 52.1).key(), FactorId(167))
}

/// Day `i` of the benchmark calendar
fn day(i: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + Duration::days(i)
}

/// Every other day, so no two segments coalesce
fn create_segments(count: usize) -> Vec<Segment> {
    let key = bench_key();
    let now = Utc::now();
    (0..count as i64)
        .map(|i| {
            let period = TimePeriod::absolute(day(2 * i), day(2 * i + 1)).unwrap();
            Segment::new(key, period, Tier::Cache, 408, DataBlock::empty(), now)
        })
        .collect()
}

fn bench_coverage(c: &mut Criterion) {
    let mut group = c.benchmark_group("coverage");

    for count in [100, 1000, 5000] {
        let segments = create_segments(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("insert", count), &segments, |b, segments| {
            b.iter(|| {
                let mut index = CoverageIndex::new();
                for segment in segments {
                    index.insert(black_box(segment.clone())).unwrap();
                }
                index
            })
        });

        let index = CoverageIndex::from_segments(segments).unwrap();
        let key = bench_key();
        let month = TimePeriod::absolute(day(count as i64), day(count as i64 + 30)).unwrap();

        group.bench_function(BenchmarkId::new("coverage_of_month", count), |b| {
            b.iter(|| index.coverage_of(black_box(&key), black_box(&month)))
        });
    }

    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    group.bench_function("put_with_eviction", |b| {
        let segments = create_segments(1000);
        b.iter(|| {
            // room for a tenth of the segments
            let cache = CacheTier::new(100 * 408, Arc::new(SystemClock));
            for segment in &segments {
                cache
                    .put(segment.key, &segment.period, DataBlock::empty(), 408)
                    .unwrap();
            }
            cache
        })
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let segments = create_segments(1000);

    group.bench_function("write_1000", |b| {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.snapshot");
        b.iter(|| write_snapshot(&path, black_box(&segments)).unwrap())
    });

    group.bench_function("read_1000", |b| {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.snapshot");
        write_snapshot(&path, &segments).unwrap();
        b.iter(|| read_snapshot(black_box(&path)).unwrap())
    });

    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("handle_warm_month", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let engine = StorageEngine::new(
                    StorageConfiguration::default(),
                    Arc::new(SyntheticUpstream::new()),
                )
                .unwrap();
                let selection = Selection::new(TimePeriod::parse("2022-01-01", "2022-02-01").unwrap())
                    .location(GeoLocation::wgs84(5.18, 52.1))
                    .factor("2t")
                    .factor("tp");

                // Setup: first request fills the cache
                engine.handle(&selection).await.unwrap();

                let start = std::time::Instant::now();

                for _ in 0..iters {
                    let _ = engine.handle(black_box(&selection)).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_coverage, bench_cache, bench_snapshot, bench_engine);
criterion_main!(benches);
