//! Microbenchmarks for the hot path: routing events through the tumbling
//! window processor and reducing a closed batch to per-source aggregates.

use std::hint::black_box;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use streampulse::aggregate::AggregatorRegistry;
use streampulse::event::{Event, EventSource, FeedPayload, LogLevel, LogPayload, Payload, SensorPayload};
use streampulse::window::{TumblingWindowProcessor, WindowBatch};

fn mixed_events(count: usize) -> Vec<Event> {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let ts = base + chrono::TimeDelta::milliseconds(i as i64 * 250);
            let payload = match i % 3 {
                0 => Payload::Sensor(SensorPayload {
                    sensor_id: "s-1".into(),
                    metric: "temperature".into(),
                    value: 20.0 + (i % 7) as f64,
                    unit: "C".into(),
                    location: None,
                }),
                1 => Payload::Log(LogPayload {
                    level: LogLevel::Info,
                    message: "Operation completed successfully".into(),
                    service: "auth-service".into(),
                    host: "node-1".into(),
                }),
                _ => Payload::Feed(FeedPayload {
                    user_id: "user-1".into(),
                    action: "login".into(),
                    resource: "/home".into(),
                    success: i % 10 != 0,
                    metadata: serde_json::Map::new(),
                }),
            };
            let source = match i % 3 {
                0 => EventSource::Sensor,
                1 => EventSource::Log,
                _ => EventSource::Feed,
            };
            Event::raw(source, payload).with_timestamp(ts)
        })
        .collect()
}

fn bench_window_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("window");
    group.measurement_time(Duration::from_secs(2));
    group.sample_size(50);

    let events = mixed_events(1000);
    group.bench_function("push_1000_events", |b| {
        b.iter_batched(
            || events.clone(),
            |events| {
                let mut processor = TumblingWindowProcessor::new(Duration::from_secs(5));
                let mut batches = 0usize;
                for event in events {
                    if processor.push(event).is_some() {
                        batches += 1;
                    }
                }
                black_box(batches)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_aggregate_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    group.measurement_time(Duration::from_secs(2));
    group.sample_size(50);

    let events = mixed_events(300);
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let batch = WindowBatch { start, end: start + chrono::TimeDelta::seconds(5), events };
    let registry = AggregatorRegistry::default();

    group.bench_function("reduce_300_event_batch", |b| {
        b.iter(|| {
            let aggregates = registry.aggregate_batch(black_box(&batch)).unwrap();
            black_box(aggregates)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_window_push, bench_aggregate_batch);
criterion_main!(benches);
