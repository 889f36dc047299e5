//! Benchmarks for the producer-facing publish path.
//!
//! `publish` runs on the benchmark engine's call path, so its cost must stay
//! negligible next to a single model request.

use benchstream::dashboard::broadcaster::{BroadcastConfig, EventBroadcaster};
use benchstream::dashboard::types::{metric_names, LogPayload, MetricsPayload, RequestCounters};
use benchstream::dashboard::{Event, EventKind, LiveMetricsSnapshot, LogLevel};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::collections::BTreeMap;

fn snapshot(samples_per_metric: usize) -> LiveMetricsSnapshot {
    let mut samples = BTreeMap::new();
    for name in [metric_names::TTFT, metric_names::OUTPUT_LATENCY] {
        let values = (0..samples_per_metric).map(|i| 0.1 + i as f64 * 0.001).collect();
        samples.insert(name.to_string(), values);
    }
    LiveMetricsSnapshot::from_samples(samples)
}

fn bench_event_construction(c: &mut Criterion) {
    let snapshot = snapshot(500);
    c.bench_function("event_new_metrics_500_samples", |b| {
        b.iter(|| {
            Event::new(
                EventKind::Metrics,
                black_box(&MetricsPayload {
                    live_metrics: snapshot.clone(),
                    requests: RequestCounters::default(),
                }),
            )
        })
    });
}

fn bench_publish_without_distribution(c: &mut Criterion) {
    let event = Event::new(
        EventKind::Log,
        &LogPayload {
            message: "request completed".to_string(),
            level: LogLevel::Info,
        },
    )
    .unwrap();

    c.bench_function("publish_into_ingest_queue", |b| {
        b.iter_batched(
            || {
                EventBroadcaster::new(BroadcastConfig {
                    event_queue_capacity: 1024,
                    ..BroadcastConfig::default()
                })
            },
            |broadcaster| {
                for _ in 0..1024 {
                    black_box(broadcaster.publish(event.clone()));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_publish_with_subscribers(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let broadcaster = EventBroadcaster::new(BroadcastConfig {
        event_queue_capacity: 1 << 16,
        subscriber_queue_capacity: 16,
        max_consecutive_drops: 0,
        ..BroadcastConfig::default()
    });
    let guard = rt.enter();
    broadcaster.start();
    let _viewers: Vec<_> = (0..8).map(|_| broadcaster.subscribe()).collect();
    let event = Event::heartbeat();

    c.bench_function("publish_with_8_stalled_subscribers", |b| {
        b.iter(|| black_box(broadcaster.publish(event.clone())))
    });

    drop(guard);
    rt.block_on(broadcaster.stop());
}

criterion_group!(
    benches,
    bench_event_construction,
    bench_publish_without_distribution,
    bench_publish_with_subscribers
);
criterion_main!(benches);
