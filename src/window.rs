//! Tumbling time windows keyed by event timestamp.
//!
//! Buckets are grid-aligned to the UTC epoch: two processors with the same
//! window size agree on every bucket edge no matter when they started.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::event::Event;

pub type Predicate = Box<dyn Fn(&Event) -> bool + Send>;
pub type Mapper = Box<dyn Fn(Event) -> Event + Send>;

/// Closed window: grid-aligned bounds plus the events that fell into it.
/// `end - start` always equals the window size.
#[derive(Debug, Clone)]
pub struct WindowBatch {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub events: Vec<Event>,
}

/// Floor `ts` onto the epoch-aligned grid of `window_size`-wide buckets.
/// Idempotent: flooring a floored timestamp is a no-op.
pub fn floor_time_to_window(ts: DateTime<Utc>, window_size: Duration) -> DateTime<Utc> {
    let w = window_size.as_secs().max(1) as i64;
    let floored = ts.timestamp().div_euclid(w) * w;
    DateTime::from_timestamp(floored, 0).expect("window-aligned timestamp in range")
}

pub struct TumblingWindowProcessor {
    window_size: Duration,
    predicates: Vec<Predicate>,
    mappers: Vec<Mapper>,
    current_start: Option<DateTime<Utc>>,
    current_events: Vec<Event>,
}

impl TumblingWindowProcessor {
    pub fn new(window_size: Duration) -> Self {
        Self {
            window_size,
            predicates: Vec::new(),
            mappers: Vec::new(),
            current_start: None,
            current_events: Vec::new(),
        }
    }

    /// Append a predicate to the filter chain; rejected events never reach a
    /// window.
    pub fn with_predicate(mut self, predicate: impl Fn(&Event) -> bool + Send + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Append a mapper; mappers run in insertion order after the predicates.
    pub fn with_mapper(mut self, mapper: impl Fn(Event) -> Event + Send + 'static) -> Self {
        self.mappers.push(Box::new(mapper));
        self
    }

    pub fn window_size(&self) -> Duration {
        self.window_size
    }

    fn delta(&self) -> TimeDelta {
        TimeDelta::seconds(self.window_size.as_secs().max(1) as i64)
    }

    fn apply_chain(&self, mut event: Event) -> Option<Event> {
        for predicate in &self.predicates {
            if !predicate(&event) {
                return None;
            }
        }
        for mapper in &self.mappers {
            event = mapper(event);
        }
        Some(event)
    }

    /// Route one event into its bucket. Returns the previous window as a
    /// batch when the event opens a different bucket.
    ///
    /// An event whose timestamp maps to an older bucket than the open one
    /// also counts as a transition: the open window closes and the older
    /// bucket is re-opened. Late arrivals may therefore re-open past
    /// windows; callers that need stricter semantics filter with a
    /// predicate.
    pub fn push(&mut self, event: Event) -> Option<WindowBatch> {
        let event = self.apply_chain(event)?;
        let ws = floor_time_to_window(event.timestamp, self.window_size);

        let Some(start) = self.current_start else {
            self.current_start = Some(ws);
            self.current_events = vec![event];
            return None;
        };

        if ws == start {
            self.current_events.push(event);
            return None;
        }

        let batch = WindowBatch {
            start,
            end: start + self.delta(),
            events: std::mem::replace(&mut self.current_events, vec![event]),
        };
        self.current_start = Some(ws);
        Some(batch)
    }

    /// Emit the open window, if any, and reset. Empty batches are never
    /// produced.
    pub fn flush(&mut self) -> Option<WindowBatch> {
        let start = self.current_start.take()?;
        if self.current_events.is_empty() {
            return None;
        }
        Some(WindowBatch {
            start,
            end: start + self.delta(),
            events: std::mem::take(&mut self.current_events),
        })
    }
}

/// Window a whole event sequence in one go, including the trailing partial
/// window.
pub fn collect_windows(
    events: impl IntoIterator<Item = Event>,
    window_size: Duration,
) -> Vec<WindowBatch> {
    let mut processor = TumblingWindowProcessor::new(window_size);
    let mut batches: Vec<WindowBatch> =
        events.into_iter().filter_map(|event| processor.push(event)).collect();
    if let Some(last) = processor.flush() {
        batches.push(last);
    }
    batches
}
