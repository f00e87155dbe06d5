//! Bounded multiplexing layer between sources and the pipeline.
//!
//! Every publish fans out to an optional per-source queue and the merged
//! queue the pipeline consumes. Queues are bounded crossbeam channels;
//! backpressure is expressed through the drop policy and the metrics ingest
//! hook, never through an error.

use std::collections::BTreeMap;
use std::time::Duration;

use crossbeam::channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use log::debug;

use crate::event::{Event, EventSource};
use crate::metrics::SharedMetrics;
use crate::signal::StopSignal;

const BLOCK_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub per_source_queue_size: usize,
    pub merged_queue_size: usize,
    /// `true`: full queues drop events. `false`: `publish` blocks until
    /// space frees up or the stop signal is set.
    pub drop_on_full: bool,
    pub enable_per_source_queues: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            per_source_queue_size: 100,
            merged_queue_size: 500,
            drop_on_full: true,
            enable_per_source_queues: true,
        }
    }
}

struct Queue {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Queue {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }
}

pub struct EventBus {
    drop_on_full: bool,
    source_queues: Option<BTreeMap<EventSource, Queue>>,
    merged: Queue,
    metrics: Option<SharedMetrics>,
    stop: StopSignal,
}

impl EventBus {
    pub fn new(config: BusConfig, metrics: Option<SharedMetrics>, stop: StopSignal) -> Self {
        let source_queues = config.enable_per_source_queues.then(|| {
            EventSource::ALL
                .into_iter()
                .map(|source| (source, Queue::new(config.per_source_queue_size)))
                .collect()
        });
        Self {
            drop_on_full: config.drop_on_full,
            source_queues,
            merged: Queue::new(config.merged_queue_size),
            metrics,
            stop,
        }
    }

    /// Publish one event. Returns `true` iff the event reached the merged
    /// queue; a per-source drop alone does not fail the publish but is
    /// counted as dropped in the metrics. Never panics, never blocks in drop
    /// mode.
    pub fn publish(&self, event: Event) -> bool {
        let source = event.source;

        let mut source_dropped = false;
        if let Some(queues) = &self.source_queues
            && let Some(queue) = queues.get(&source)
        {
            source_dropped = !self.enqueue(&queue.tx, event.clone());
        }

        let merged_ok = self.enqueue(&self.merged.tx, event);
        if !merged_ok || source_dropped {
            debug!("bus: dropped {} event (source={} merged={})", source.as_str(), source_dropped, !merged_ok);
        }

        if let Some(metrics) = &self.metrics {
            metrics.lock().record_ingest(source, source_dropped || !merged_ok, self.queue_sizes());
        }

        merged_ok
    }

    fn enqueue(&self, tx: &Sender<Event>, event: Event) -> bool {
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) => false,
            Err(TrySendError::Full(event)) => {
                if self.drop_on_full {
                    return false;
                }
                // Block mode: wait for space, re-checking the stop signal so
                // a stalled consumer cannot wedge shutdown.
                let mut event = event;
                loop {
                    match tx.send_timeout(event, BLOCK_POLL) {
                        Ok(()) => return true,
                        Err(SendTimeoutError::Timeout(back)) => {
                            if self.stop.is_set() {
                                return false;
                            }
                            event = back;
                        }
                        Err(SendTimeoutError::Disconnected(_)) => return false,
                    }
                }
            }
        }
    }

    /// Consumer side of the merged queue; the channel is MPMC so clones
    /// share the same stream.
    pub fn merged_receiver(&self) -> Receiver<Event> {
        self.merged.rx.clone()
    }

    pub fn source_receiver(&self, source: EventSource) -> Option<Receiver<Event>> {
        self.source_queues.as_ref().and_then(|queues| queues.get(&source)).map(|q| q.rx.clone())
    }

    /// Current depths keyed by source value plus `"merged"`.
    pub fn queue_sizes(&self) -> BTreeMap<String, usize> {
        let mut sizes: BTreeMap<String, usize> = self
            .source_queues
            .iter()
            .flatten()
            .map(|(source, queue)| (source.as_str().to_string(), queue.tx.len()))
            .collect();
        sizes.insert("merged".to_string(), self.merged.tx.len());
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Payload;
    use crate::metrics::MetricsCollector;
    use serde_json::Map;
    use std::time::Instant;

    fn event(source: EventSource) -> Event {
        Event::raw(source, Payload::Other(Map::new()))
    }

    fn bus(config: BusConfig, metrics: Option<SharedMetrics>) -> EventBus {
        EventBus::new(config, metrics, StopSignal::new())
    }

    #[test]
    fn second_publish_drops_when_merged_queue_is_full() {
        let metrics = MetricsCollector::new().into_shared();
        let bus = bus(
            BusConfig {
                per_source_queue_size: 1,
                merged_queue_size: 1,
                drop_on_full: true,
                enable_per_source_queues: false,
            },
            Some(metrics.clone()),
        );

        assert!(bus.publish(event(EventSource::Log)));
        assert!(!bus.publish(event(EventSource::Log)));

        let snap = metrics.lock().snapshot();
        assert_eq!(snap.ingested_total, 2);
        assert_eq!(snap.dropped_total, 1);
        assert_eq!(snap.dropped_by_source[&EventSource::Log], 1);
    }

    #[test]
    fn source_queue_drop_counts_but_publish_still_succeeds() {
        let metrics = MetricsCollector::new().into_shared();
        let bus = bus(
            BusConfig {
                per_source_queue_size: 1,
                merged_queue_size: 10,
                drop_on_full: true,
                enable_per_source_queues: true,
            },
            Some(metrics.clone()),
        );

        assert!(bus.publish(event(EventSource::Sensor)));
        // source queue is now full, merged still has room
        assert!(bus.publish(event(EventSource::Sensor)));

        let snap = metrics.lock().snapshot();
        assert_eq!(snap.dropped_total, 1);
        assert_eq!(snap.ingested_total, 2);
    }

    #[test]
    fn overflow_drops_exactly_capacity_excess() {
        let bus = bus(
            BusConfig {
                per_source_queue_size: 1,
                merged_queue_size: 3,
                drop_on_full: true,
                enable_per_source_queues: false,
            },
            None,
        );

        let accepted = (0..5).filter(|_| bus.publish(event(EventSource::Feed))).count();
        assert_eq!(accepted, 3);
        assert_eq!(bus.queue_sizes()["merged"], 3);
    }

    #[test]
    fn queue_sizes_reports_all_queues() {
        let bus = bus(BusConfig::default(), None);
        let sizes = bus.queue_sizes();
        assert_eq!(sizes.len(), 4);
        assert!(sizes.contains_key("merged"));
        assert!(sizes.contains_key("log"));
        assert!(sizes.contains_key("sensor"));
        assert!(sizes.contains_key("feed"));
    }

    #[test]
    fn draining_the_merged_queue_frees_capacity() {
        let bus = bus(
            BusConfig {
                per_source_queue_size: 1,
                merged_queue_size: 1,
                drop_on_full: true,
                enable_per_source_queues: false,
            },
            None,
        );
        let rx = bus.merged_receiver();

        assert!(bus.publish(event(EventSource::Log)));
        assert!(!bus.publish(event(EventSource::Log)));
        rx.try_recv().unwrap();
        assert!(bus.publish(event(EventSource::Log)));
    }

    #[test]
    fn blocking_publish_gives_up_once_stopped() {
        let stop = StopSignal::new();
        let bus = EventBus::new(
            BusConfig {
                per_source_queue_size: 1,
                merged_queue_size: 1,
                drop_on_full: false,
                enable_per_source_queues: false,
            },
            None,
            stop.clone(),
        );

        assert!(bus.publish(event(EventSource::Log)));
        stop.set();
        let started = Instant::now();
        assert!(!bus.publish(event(EventSource::Log)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
