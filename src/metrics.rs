//! Metrics collection for the engine: counters, sliding rate meters, latency
//! quantiles, queue depth snapshots and per-window records.
//!
//! One `MetricsCollector` is shared behind a mutex: the bus writes the ingest
//! path, the pipeline writes the processed/aggregated/window paths, and
//! `snapshot()` produces an internally consistent copy under the same lock.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::event::EventSource;

const RATE_WINDOW: Duration = Duration::from_secs(10);
const LATENCY_MAX_SAMPLES: usize = 2000;
const WINDOW_MAX_SAMPLES: usize = 200;

pub type SharedMetrics = Arc<Mutex<MetricsCollector>>;

/// Events-per-second meter over a sliding wall-clock window.
#[derive(Debug)]
pub struct RateMeter {
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RateMeter {
    pub fn new(window: Duration) -> Self {
        Self { window, timestamps: VecDeque::new() }
    }

    pub fn mark(&mut self) {
        let now = Instant::now();
        self.timestamps.push_back(now);
        self.trim(now);
    }

    fn trim(&mut self, now: Instant) {
        let cutoff = now.checked_sub(self.window);
        let Some(cutoff) = cutoff else { return };
        while self.timestamps.front().is_some_and(|t| *t < cutoff) {
            self.timestamps.pop_front();
        }
    }

    pub fn rate_per_sec(&mut self) -> f64 {
        self.trim(Instant::now());
        self.timestamps.len() as f64 / self.window.as_secs_f64()
    }
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new(RATE_WINDOW)
    }
}

/// Bounded FIFO of latency samples with sort-and-index quantiles.
#[derive(Debug)]
pub struct LatencyMeter {
    max_samples: usize,
    samples_ms: VecDeque<f64>,
}

impl LatencyMeter {
    pub fn new(max_samples: usize) -> Self {
        Self { max_samples, samples_ms: VecDeque::new() }
    }

    pub fn add(&mut self, latency_ms: f64) {
        self.samples_ms.push_back(latency_ms);
        while self.samples_ms.len() > self.max_samples {
            self.samples_ms.pop_front();
        }
    }

    /// p50/p95 by truncating index into the ascending sample order.
    pub fn snapshot(&self) -> LatencySnapshot {
        if self.samples_ms.is_empty() {
            return LatencySnapshot::default();
        }
        let mut xs: Vec<f64> = self.samples_ms.iter().copied().collect();
        xs.sort_by(f64::total_cmp);
        let n = xs.len();
        let avg = xs.iter().sum::<f64>() / n as f64;
        let p50 = xs[(0.50 * (n - 1) as f64) as usize];
        let p95 = xs[(0.95 * (n - 1) as f64) as usize];
        LatencySnapshot { avg_ms: Some(avg), p50_ms: Some(p50), p95_ms: Some(p95) }
    }
}

impl Default for LatencyMeter {
    fn default() -> Self {
        Self::new(LATENCY_MAX_SAMPLES)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySnapshot {
    pub avg_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
}

/// One closed window as the pipeline reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetric {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count_total: u64,
    pub count_by_source: BTreeMap<EventSource, u64>,
    pub aggregates_emitted: u64,
    pub aggregation_time_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantileStats {
    pub avg: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub last_window: Option<WindowMetric>,
    pub agg_time_ms: QuantileStats,
    pub count_total: QuantileStats,
    pub aggregates_emitted_avg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatesSnapshot {
    pub ingest: f64,
    pub process: f64,
    pub aggregate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceProcessing {
    pub processed_total: u64,
    pub process_eps: f64,
    pub latency_ms: LatencySnapshot,
}

/// Point-in-time copy of every metric the collector tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ingested_total: u64,
    pub ingested_by_source: BTreeMap<EventSource, u64>,
    pub dropped_total: u64,
    pub dropped_by_source: BTreeMap<EventSource, u64>,
    pub processed_total: u64,
    pub aggregated_total: u64,
    pub rates_eps: RatesSnapshot,
    pub event_processing_latency_ms: LatencySnapshot,
    pub per_source_processing: BTreeMap<EventSource, SourceProcessing>,
    pub queue_sizes: BTreeMap<String, usize>,
    pub drop_ratio: f64,
    pub window_metrics: WindowSummary,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    ingested_total: u64,
    ingested_by_source: BTreeMap<EventSource, u64>,
    dropped_total: u64,
    dropped_by_source: BTreeMap<EventSource, u64>,

    processed_total: u64,
    aggregated_total: u64,

    processed_by_source: BTreeMap<EventSource, u64>,
    process_rate_by_source: BTreeMap<EventSource, RateMeter>,
    latency_by_source: BTreeMap<EventSource, LatencyMeter>,

    ingest_rate: RateMeter,
    process_rate: RateMeter,
    aggregate_rate: RateMeter,
    event_latency: LatencyMeter,

    last_queue_sizes: BTreeMap<String, usize>,
    windows: VecDeque<WindowMetric>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedMetrics {
        Arc::new(Mutex::new(self))
    }

    pub fn record_ingest(
        &mut self,
        source: EventSource,
        dropped: bool,
        queue_sizes: BTreeMap<String, usize>,
    ) {
        self.ingested_total += 1;
        *self.ingested_by_source.entry(source).or_insert(0) += 1;
        self.ingest_rate.mark();

        if dropped {
            self.dropped_total += 1;
            *self.dropped_by_source.entry(source).or_insert(0) += 1;
        }

        self.last_queue_sizes = queue_sizes;
    }

    pub fn record_processed(&mut self, source: EventSource, latency_ms: f64) {
        self.processed_total += 1;
        self.process_rate.mark();
        self.event_latency.add(latency_ms);

        *self.processed_by_source.entry(source).or_insert(0) += 1;
        self.process_rate_by_source.entry(source).or_default().mark();
        self.latency_by_source.entry(source).or_default().add(latency_ms);
    }

    pub fn record_aggregated(&mut self) {
        self.aggregated_total += 1;
        self.aggregate_rate.mark();
    }

    pub fn record_window(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        count_by_source: BTreeMap<EventSource, u64>,
        aggregates_emitted: u64,
        aggregation_time_ms: f64,
    ) {
        let count_total = count_by_source.values().sum();
        self.windows.push_back(WindowMetric {
            start,
            end,
            count_total,
            count_by_source,
            aggregates_emitted,
            aggregation_time_ms,
        });
        while self.windows.len() > WINDOW_MAX_SAMPLES {
            self.windows.pop_front();
        }
    }

    fn window_summary(&self) -> WindowSummary {
        if self.windows.is_empty() {
            return WindowSummary::default();
        }

        let mut agg_times: Vec<f64> = self.windows.iter().map(|w| w.aggregation_time_ms).collect();
        agg_times.sort_by(f64::total_cmp);
        let mut counts: Vec<f64> = self.windows.iter().map(|w| w.count_total as f64).collect();
        counts.sort_by(f64::total_cmp);
        let n = self.windows.len() as f64;

        let emitted_avg =
            self.windows.iter().map(|w| w.aggregates_emitted as f64).sum::<f64>() / n;

        WindowSummary {
            last_window: self.windows.back().cloned(),
            agg_time_ms: quantile_stats(&agg_times),
            count_total: quantile_stats(&counts),
            aggregates_emitted_avg: Some(emitted_avg),
        }
    }

    /// Consistent copy of all metrics. Takes `&mut self` because the rate
    /// meters prune their sliding windows on read.
    pub fn snapshot(&mut self) -> MetricsSnapshot {
        let mut per_source = BTreeMap::new();
        let known: Vec<EventSource> = self
            .ingested_by_source
            .keys()
            .chain(self.processed_by_source.keys())
            .copied()
            .collect();
        for source in known {
            if per_source.contains_key(&source) {
                continue;
            }
            let eps = self
                .process_rate_by_source
                .get_mut(&source)
                .map_or(0.0, RateMeter::rate_per_sec);
            let latency = self
                .latency_by_source
                .get(&source)
                .map_or_else(LatencySnapshot::default, LatencyMeter::snapshot);
            per_source.insert(
                source,
                SourceProcessing {
                    processed_total: self.processed_by_source.get(&source).copied().unwrap_or(0),
                    process_eps: eps,
                    latency_ms: latency,
                },
            );
        }

        let drop_ratio = if self.ingested_total > 0 {
            self.dropped_total as f64 / self.ingested_total as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            ingested_total: self.ingested_total,
            ingested_by_source: self.ingested_by_source.clone(),
            dropped_total: self.dropped_total,
            dropped_by_source: self.dropped_by_source.clone(),
            processed_total: self.processed_total,
            aggregated_total: self.aggregated_total,
            rates_eps: RatesSnapshot {
                ingest: self.ingest_rate.rate_per_sec(),
                process: self.process_rate.rate_per_sec(),
                aggregate: self.aggregate_rate.rate_per_sec(),
            },
            event_processing_latency_ms: self.event_latency.snapshot(),
            per_source_processing: per_source,
            queue_sizes: self.last_queue_sizes.clone(),
            drop_ratio,
            window_metrics: self.window_summary(),
        }
    }
}

/// Quantiles over the retained window records: ceil index into ascending
/// order, unlike the latency meters which truncate.
fn quantile_stats(sorted: &[f64]) -> QuantileStats {
    if sorted.is_empty() {
        return QuantileStats::default();
    }
    let n = sorted.len();
    let avg = sorted.iter().sum::<f64>() / n as f64;
    let at = |q: f64| sorted[(q * (n - 1) as f64).ceil() as usize];
    QuantileStats { avg: Some(avg), p50: Some(at(0.50)), p95: Some(at(0.95)) }
}
