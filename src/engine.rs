//! Embedding entry point: one blocking `run_engine` call wires the bus, the
//! demo sources, the pipeline and the sink service loops together. The host
//! supplies a stop signal and a bounded sink and typically parks the call on
//! its own thread; the engine makes no assumption about the host scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam::channel::{RecvTimeoutError, Sender, bounded};
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;

use crate::aggregate::AggregatorRegistry;
use crate::bus::{BusConfig, EventBus};
use crate::event::{Event, EventSource};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::pipeline::{PipelineHooks, PipelineRunner};
use crate::signal::StopSignal;
use crate::sources::{FeedSource, LogSource, SensorSource};
use crate::supervisor::Supervisor;
use crate::window::TumblingWindowProcessor;

pub const WINDOW_SIZE: Duration = Duration::from_secs(5);

const METRICS_INTERVAL: Duration = Duration::from_secs(2);
const FORWARD_POLL: Duration = Duration::from_millis(500);
const EVENT_EMIT_MIN_GAP: Duration = Duration::from_millis(100);
const OUTPUT_QUEUE_SIZE: usize = 256;
const HOST_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Clamp the other parameters to aggressive values that make drops and
    /// backpressure visible.
    pub stress_mode: bool,
    pub per_source_queue_size: usize,
    pub merged_queue_size: usize,
    /// Slept after each closed batch.
    pub artificial_delay: Duration,
    pub log_base_interval: Duration,
    pub log_burst_interval: Duration,
    pub log_burst_probability: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stress_mode: false,
            per_source_queue_size: 10,
            merged_queue_size: 30,
            artificial_delay: Duration::ZERO,
            log_base_interval: Duration::from_millis(200),
            log_burst_interval: Duration::from_millis(50),
            log_burst_probability: 0.6,
        }
    }
}

impl EngineConfig {
    pub fn stress() -> Self {
        Self { stress_mode: true, ..Self::default() }
    }

    /// Stress clamping plus the hard ≥1 queue bounds.
    fn effective(&self) -> EngineConfig {
        let mut cfg = self.clone();
        if cfg.stress_mode {
            cfg.per_source_queue_size = cfg.per_source_queue_size.min(2);
            cfg.merged_queue_size = cfg.merged_queue_size.min(5);
            cfg.artificial_delay = cfg.artificial_delay.max(Duration::from_millis(30));
            cfg.log_base_interval = cfg.log_base_interval.min(Duration::from_millis(60));
            cfg.log_burst_interval = cfg.log_burst_interval.min(Duration::from_millis(10));
            cfg.log_burst_probability = cfg.log_burst_probability.max(0.9);
        }
        cfg.per_source_queue_size = cfg.per_source_queue_size.max(1);
        cfg.merged_queue_size = cfg.merged_queue_size.max(1);
        cfg
    }
}

/// Tagged messages delivered to the host sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkMessage {
    Event { ts: f64, data: Event },
    Agg { ts: f64, data: Event },
    Metrics { ts: f64, data: Box<MetricsSnapshot> },
}

impl SinkMessage {
    fn now_ts() -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }

    pub fn event(data: Event) -> Self {
        SinkMessage::Event { ts: Self::now_ts(), data }
    }

    pub fn agg(data: Event) -> Self {
        SinkMessage::Agg { ts: Self::now_ts(), data }
    }

    pub fn metrics(data: MetricsSnapshot) -> Self {
        SinkMessage::Metrics { ts: Self::now_ts(), data: Box::new(data) }
    }
}

/// Per-source rate limiter for `event` sink messages: at most one emit per
/// source per 100 ms, overflow dropped silently.
fn rate_limited_emitter(out: Sender<SinkMessage>) -> Box<dyn Fn(&Event) + Send> {
    let last_emit: Mutex<BTreeMap<EventSource, Instant>> = Mutex::new(BTreeMap::new());
    Box::new(move |event| {
        let mut last = last_emit.lock();
        let now = Instant::now();
        let recent = last
            .get(&event.source)
            .is_some_and(|prev| now.duration_since(*prev) < EVENT_EMIT_MIN_GAP);
        if recent {
            return;
        }
        last.insert(event.source, now);
        drop(last);
        if out.try_send(SinkMessage::event(event.clone())).is_err() {
            debug!("sink full, event preview dropped");
        }
    })
}

/// Run the engine until `host_stop` is set, streaming events, aggregates and
/// periodic metrics snapshots into `out`. Blocks the calling thread and
/// returns the final metrics snapshot after shutdown.
pub fn run_engine(
    host_stop: StopSignal,
    out: Sender<SinkMessage>,
    config: EngineConfig,
) -> MetricsSnapshot {
    let cfg = config.effective();
    info!(
        "engine starting (stress={}, per_source={}, merged={})",
        cfg.stress_mode, cfg.per_source_queue_size, cfg.merged_queue_size
    );

    let metrics = MetricsCollector::new().into_shared();
    let stop = StopSignal::new();
    let bus = Arc::new(EventBus::new(
        BusConfig {
            per_source_queue_size: cfg.per_source_queue_size,
            merged_queue_size: cfg.merged_queue_size,
            drop_on_full: true,
            enable_per_source_queues: false,
        },
        Some(metrics.clone()),
        stop.clone(),
    ));

    let mut supervisor = Supervisor::new(bus.clone(), stop.clone());
    supervisor.register(
        SensorSource::new(bus.clone(), stop.clone(), "sensor-1").with_location("lab-1"),
    );
    supervisor.register(
        LogSource::new(bus.clone(), stop.clone(), "auth-service", "node-1").with_intervals(
            cfg.log_base_interval,
            cfg.log_burst_interval,
            cfg.log_burst_probability,
        ),
    );
    supervisor.register(
        FeedSource::new(
            bus.clone(),
            stop.clone(),
            vec!["user-1".into(), "user-2".into(), "user-3".into()],
            vec!["login".into(), "logout".into(), "click".into(), "purchase".into()],
            vec!["/home".into(), "/dashboard".into(), "/checkout".into()],
        )
        .with_interval_range(Duration::from_millis(1500), Duration::from_secs(3)),
    );
    supervisor.start();

    let (agg_tx, agg_rx) = bounded::<Event>(OUTPUT_QUEUE_SIZE);

    let hooks = PipelineHooks {
        on_event: Some(rate_limited_emitter(out.clone())),
        on_after_batch: (cfg.artificial_delay > Duration::ZERO).then(|| {
            let delay = cfg.artificial_delay;
            Box::new(move || thread::sleep(delay)) as Box<dyn Fn() + Send>
        }),
    };
    let runner = PipelineRunner::new(
        bus.merged_receiver(),
        agg_tx,
        TumblingWindowProcessor::new(WINDOW_SIZE),
        AggregatorRegistry::default(),
        Some(metrics.clone()),
        stop.clone(),
        hooks,
    );
    let pipeline = thread::spawn(move || runner.run());

    let publisher = {
        let stop = stop.clone();
        let metrics = metrics.clone();
        let out = out.clone();
        thread::spawn(move || {
            while !stop.is_set() {
                stop.sleep(METRICS_INTERVAL);
                if stop.is_set() {
                    break;
                }
                let snapshot = metrics.lock().snapshot();
                if out.try_send(SinkMessage::metrics(snapshot)).is_err() {
                    debug!("sink full, metrics snapshot dropped");
                }
            }
        })
    };

    let forwarder = {
        let stop = stop.clone();
        let out = out.clone();
        thread::spawn(move || {
            while !stop.is_set() {
                match agg_rx.recv_timeout(FORWARD_POLL) {
                    Ok(aggregate) => {
                        if out.try_send(SinkMessage::agg(aggregate)).is_err() {
                            debug!("sink full, aggregate dropped");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
    };

    while !host_stop.is_set() {
        thread::sleep(HOST_POLL);
    }

    info!("engine stopping");
    supervisor.stop();
    let _ = pipeline.join();
    let _ = publisher.join();
    let _ = forwarder.join();

    let snapshot = metrics.lock().snapshot();
    info!(
        "engine stopped (ingested={}, processed={}, dropped={}, drop_ratio={:.3})",
        snapshot.ingested_total, snapshot.processed_total, snapshot.dropped_total,
        snapshot.drop_ratio
    );
    snapshot
}
