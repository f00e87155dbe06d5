//! # Streampulse
//!
//! Streaming event-processing engine: heterogeneous sources publish into a
//! bounded event bus with an explicit drop policy, a pipeline buckets the
//! merged stream into epoch-aligned tumbling windows keyed by event
//! timestamp, per-source aggregators reduce each closed window, and a
//! metrics collector tracks rates, latency quantiles, drops and queue
//! depths.
//!
//! ## Architecture
//! - **Sources (3x demo):** log, sensor, feed producers on their own threads,
//!   observing one shared [`signal::StopSignal`].
//! - **Bus:** per-source + merged bounded crossbeam queues; drop-on-full or
//!   blocking publish.
//! - **Pipeline:** merged queue → tumbling windows → per-source aggregates →
//!   bounded output queue.
//! - **Supervisor:** starts source threads, surfaces crashes, joins on stop.
//! - **Engine:** [`engine::run_engine`] wires everything behind a stop signal
//!   and a bounded host sink.

pub mod aggregate;
pub mod bus;
pub mod engine;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod signal;
pub mod sources;
pub mod supervisor;
pub mod window;

pub use engine::{EngineConfig, SinkMessage, run_engine};
pub use error::EngineError;
pub use event::{Event, EventSource, EventType, LogLevel, Payload};
pub use metrics::{MetricsCollector, MetricsSnapshot, SharedMetrics};
pub use signal::StopSignal;
