//! Correlation cache benchmarks.

use canopy_core::{CorrelationCache, Reading, TopicRouter};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_ingest_pair(c: &mut Criterion) {
    let cache = CorrelationCache::new();
    let temperature = Reading::new("kitchen", "temperature", 22.0);
    let humidity = Reading::new("kitchen", "humidity", 40.0);

    c.bench_function("ingest_pair", |b| {
        b.iter(|| {
            cache.ingest(black_box(&temperature));
            cache.ingest(black_box(&humidity))
        })
    });
}

fn bench_ingest_many_locations(c: &mut Criterion) {
    let cache = CorrelationCache::new();
    let readings: Vec<Reading> = (0..256)
        .map(|i| Reading::new(format!("room-{i}"), "temperature", 21.0))
        .collect();

    c.bench_function("ingest_256_locations", |b| {
        b.iter(|| {
            for reading in &readings {
                cache.ingest(black_box(reading));
            }
        })
    });
}

fn bench_route(c: &mut Criterion) {
    let router = TopicRouter::new();

    c.bench_function("route_topic", |b| {
        b.iter(|| router.route(black_box("home/living-room/temperature")))
    });
}

criterion_group!(
    benches,
    bench_ingest_pair,
    bench_ingest_many_locations,
    bench_route
);
criterion_main!(benches);
