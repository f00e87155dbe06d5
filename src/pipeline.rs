//! Pipeline runner: consumes the merged queue, feeds the tumbling-window
//! processor, aggregates closed batches and forwards the aggregates to the
//! output queue while keeping the metrics collector up to date.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error};

use crate::aggregate::AggregatorRegistry;
use crate::event::{Event, EventSource};
use crate::metrics::SharedMetrics;
use crate::signal::StopSignal;
use crate::window::{TumblingWindowProcessor, WindowBatch};

// Input poll so the stop signal is observed without a consumer-side wakeup.
const RECV_POLL: Duration = Duration::from_millis(100);

/// Optional injection points around the processing loop.
#[derive(Default)]
pub struct PipelineHooks {
    /// Called for every event after its metrics are recorded; the engine
    /// uses this for rate-limited UI previews.
    pub on_event: Option<Box<dyn Fn(&Event) + Send>>,
    /// Called after each closed batch; stress setups inject an artificial
    /// delay here.
    pub on_after_batch: Option<Box<dyn Fn() + Send>>,
}

pub struct PipelineRunner {
    input: Receiver<Event>,
    output: Sender<Event>,
    processor: TumblingWindowProcessor,
    aggregators: AggregatorRegistry,
    metrics: Option<SharedMetrics>,
    stop: StopSignal,
    hooks: PipelineHooks,
}

impl PipelineRunner {
    pub fn new(
        input: Receiver<Event>,
        output: Sender<Event>,
        processor: TumblingWindowProcessor,
        aggregators: AggregatorRegistry,
        metrics: Option<SharedMetrics>,
        stop: StopSignal,
        hooks: PipelineHooks,
    ) -> Self {
        Self { input, output, processor, aggregators, metrics, stop, hooks }
    }

    /// Loop until the stop signal is set, then flush and handle the final
    /// partial window exactly like a regular batch.
    pub fn run(mut self) {
        while !self.stop.is_set() {
            match self.input.recv_timeout(RECV_POLL) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Some(batch) = self.processor.flush() {
            self.handle_batch(batch);
        }
        debug!("pipeline stopped");
    }

    fn handle_event(&mut self, event: Event) {
        if let Some(metrics) = &self.metrics {
            let latency_ms = (Utc::now() - event.timestamp).as_seconds_f64() * 1000.0;
            metrics.lock().record_processed(event.source, latency_ms);
        }

        if let Some(on_event) = &self.hooks.on_event {
            on_event(&event);
        }

        if let Some(batch) = self.processor.push(event) {
            self.handle_batch(batch);
        }
    }

    fn handle_batch(&mut self, batch: WindowBatch) {
        let mut count_by_source: BTreeMap<EventSource, u64> =
            EventSource::ALL.into_iter().map(|s| (s, 0)).collect();
        for event in &batch.events {
            *count_by_source.entry(event.source).or_insert(0) += 1;
        }

        let started = Instant::now();
        let aggregates = match self.aggregators.aggregate_batch(&batch) {
            Ok(aggregates) => aggregates,
            Err(err) => {
                error!("window aggregation failed: {err}");
                return;
            }
        };
        let aggregation_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let emitted = aggregates.len() as u64;
        for aggregate in aggregates {
            // never block toward the consumer side; a full output queue
            // loses the aggregate, not the pipeline
            if self.output.try_send(aggregate).is_err() {
                debug!("output queue full, aggregate dropped");
            }
            if let Some(metrics) = &self.metrics {
                metrics.lock().record_aggregated();
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.lock().record_window(
                batch.start,
                batch.end,
                count_by_source,
                emitted,
                aggregation_time_ms,
            );
        }

        if let Some(on_after_batch) = &self.hooks.on_after_batch {
            on_after_batch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, Payload, SensorPayload};
    use crate::metrics::MetricsCollector;
    use chrono::{DateTime, TimeZone};
    use crossbeam::channel::bounded;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, second).unwrap()
    }

    fn sensor_event(ts: DateTime<Utc>, value: f64) -> Event {
        Event::raw(
            EventSource::Sensor,
            Payload::Sensor(SensorPayload {
                sensor_id: "s-1".into(),
                metric: "temperature".into(),
                value,
                unit: "C".into(),
                location: None,
            }),
        )
        .with_timestamp(ts)
    }

    #[test]
    fn pipeline_emits_aggregates_on_transition_and_on_flush() {
        let stop = StopSignal::new();
        let metrics = MetricsCollector::new().into_shared();
        let (in_tx, in_rx) = bounded(16);
        let (out_tx, out_rx) = bounded(16);

        let events_seen = Arc::new(AtomicUsize::new(0));
        let batches_seen = Arc::new(AtomicUsize::new(0));
        let hooks = PipelineHooks {
            on_event: Some(Box::new({
                let events_seen = events_seen.clone();
                move |_| {
                    events_seen.fetch_add(1, Ordering::Relaxed);
                }
            })),
            on_after_batch: Some(Box::new({
                let batches_seen = batches_seen.clone();
                move || {
                    batches_seen.fetch_add(1, Ordering::Relaxed);
                }
            })),
        };

        let runner = PipelineRunner::new(
            in_rx,
            out_tx,
            TumblingWindowProcessor::new(Duration::from_secs(5)),
            AggregatorRegistry::default(),
            Some(metrics.clone()),
            stop.clone(),
            hooks,
        );
        let handle = thread::spawn(move || runner.run());

        in_tx.send(sensor_event(at(0), 10.0)).unwrap();
        in_tx.send(sensor_event(at(2), 20.0)).unwrap();
        in_tx.send(sensor_event(at(6), 30.0)).unwrap();

        // third event closes [12:00:00, 12:00:05)
        let first = out_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.event_type, EventType::Aggregated);
        let Payload::Aggregated(payload) = &first.payload else {
            panic!("expected aggregated payload");
        };
        assert_eq!(payload.window.start, at(0));
        assert_eq!(payload.window.count, 2);

        stop.set();
        handle.join().unwrap();

        // flush emitted the trailing window
        let second = out_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let Payload::Aggregated(payload) = &second.payload else {
            panic!("expected aggregated payload");
        };
        assert_eq!(payload.window.start, at(5));
        assert_eq!(payload.window.count, 1);

        assert_eq!(events_seen.load(Ordering::Relaxed), 3);
        assert_eq!(batches_seen.load(Ordering::Relaxed), 2);

        let snap = metrics.lock().snapshot();
        assert_eq!(snap.processed_total, 3);
        assert_eq!(snap.aggregated_total, 2);
        let last = snap.window_metrics.last_window.unwrap();
        assert_eq!(last.count_by_source[&EventSource::Sensor], 1);
        assert_eq!(last.count_by_source[&EventSource::Log], 0);
        assert_eq!(last.aggregates_emitted, 1);
        assert!(last.aggregation_time_ms >= 0.0);
    }

    #[test]
    fn pipeline_stops_on_disconnected_input() {
        let stop = StopSignal::new();
        let (in_tx, in_rx) = bounded::<Event>(4);
        let (out_tx, out_rx) = bounded(4);

        let runner = PipelineRunner::new(
            in_rx,
            out_tx,
            TumblingWindowProcessor::new(Duration::from_secs(5)),
            AggregatorRegistry::default(),
            None,
            stop,
            PipelineHooks::default(),
        );
        let handle = thread::spawn(move || runner.run());

        in_tx.send(sensor_event(at(1), 1.0)).unwrap();
        drop(in_tx);
        handle.join().unwrap();

        // open window still flushed on the way out
        let flushed = out_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(flushed.event_type, EventType::Aggregated);
    }
}
