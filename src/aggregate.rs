//! Per-source window reducers and the open registry that maps a source to
//! its reducer. Reducers are pure: a slice of events in, one summary out.

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::event::{AggregateSummary, AggregatedPayload, Event, EventSource, WindowMeta};
use crate::window::WindowBatch;

pub type Reducer = Box<dyn Fn(&[Event]) -> AggregateSummary + Send + Sync>;

/// Average of the numeric sensor values; value is `None` when every event in
/// the partition lacked one.
pub fn sensor_avg(events: &[Event]) -> AggregateSummary {
    let values: Vec<f64> = events.iter().filter_map(|e| e.payload.sensor_value()).collect();
    let value = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
    AggregateSummary::Avg { metric: "sensor.value".to_string(), value }
}

/// Count of log events per level; events without a level count as `UNKNOWN`.
pub fn log_level_counts(events: &[Event]) -> AggregateSummary {
    let mut levels: BTreeMap<String, u64> = BTreeMap::new();
    for event in events {
        let level = event.payload.log_level().unwrap_or("UNKNOWN");
        *levels.entry(level.to_string()).or_insert(0) += 1;
    }
    AggregateSummary::CountByLevel { levels }
}

/// Count of feed events per action plus the share of successful ones.
pub fn feed_action_counts(events: &[Event]) -> AggregateSummary {
    let mut actions: BTreeMap<String, u64> = BTreeMap::new();
    let mut ok = 0u64;
    for event in events {
        let action = event.payload.feed_action().unwrap_or("UNKNOWN");
        *actions.entry(action.to_string()).or_insert(0) += 1;
        if event.payload.feed_success() == Some(true) {
            ok += 1;
        }
    }
    let success_rate = ok as f64 / events.len() as f64;
    AggregateSummary::CountByAction { actions, success_rate }
}

/// Maps each source to its reducer. The set is open: callers can replace a
/// built-in reducer or add one for a source that has none.
pub struct AggregatorRegistry {
    reducers: BTreeMap<EventSource, Reducer>,
}

impl Default for AggregatorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(EventSource::Sensor, sensor_avg);
        registry.register(EventSource::Log, log_level_counts);
        registry.register(EventSource::Feed, feed_action_counts);
        registry
    }
}

impl AggregatorRegistry {
    pub fn empty() -> Self {
        Self { reducers: BTreeMap::new() }
    }

    pub fn register(
        &mut self,
        source: EventSource,
        reducer: impl Fn(&[Event]) -> AggregateSummary + Send + Sync + 'static,
    ) {
        self.reducers.insert(source, Box::new(reducer));
    }

    /// Partition the batch by source and reduce each non-empty partition to
    /// one aggregated event carrying the batch's grid-aligned window bounds.
    ///
    /// The pipeline never hands over an empty batch; an empty one here is a
    /// bug and comes back as `EngineError::EmptyWindow`.
    pub fn aggregate_batch(&self, batch: &WindowBatch) -> Result<Vec<Event>, EngineError> {
        if batch.events.is_empty() {
            return Err(EngineError::EmptyWindow);
        }

        let mut out = Vec::new();
        for source in EventSource::ALL {
            let Some(reducer) = self.reducers.get(&source) else { continue };
            let partition: Vec<Event> =
                batch.events.iter().filter(|e| e.source == source).cloned().collect();
            if partition.is_empty() {
                continue;
            }
            let summary = reducer(&partition);
            out.push(Event::aggregated(
                source,
                AggregatedPayload {
                    summary,
                    window: WindowMeta {
                        start: batch.start,
                        end: batch.end,
                        count: partition.len(),
                    },
                },
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, FeedPayload, LogLevel, LogPayload, Payload, SensorPayload};
    use chrono::{TimeZone, Utc};
    use serde_json::Map;

    fn ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn sensor(value: f64) -> Event {
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
        .with_timestamp(ts())
    }

    fn log(level: LogLevel) -> Event {
        Event::raw(
            EventSource::Log,
            Payload::Log(LogPayload {
                level,
                message: "m".into(),
                service: "svc".into(),
                host: "h".into(),
            }),
        )
        .with_timestamp(ts())
    }

    fn feed(action: &str, success: bool) -> Event {
        Event::raw(
            EventSource::Feed,
            Payload::Feed(FeedPayload {
                user_id: "u-1".into(),
                action: action.into(),
                resource: "/home".into(),
                success,
                metadata: Map::new(),
            }),
        )
        .with_timestamp(ts())
    }

    fn batch(events: Vec<Event>) -> WindowBatch {
        let start = ts();
        WindowBatch { start, end: start + chrono::TimeDelta::seconds(5), events }
    }

    #[test]
    fn sensor_avg_averages_present_values() {
        let out = sensor_avg(&[sensor(10.0), sensor(20.0)]);
        assert_eq!(out, AggregateSummary::Avg { metric: "sensor.value".into(), value: Some(15.0) });
    }

    #[test]
    fn sensor_avg_is_null_when_no_values_present() {
        let bare = Event::raw(EventSource::Sensor, Payload::Other(Map::new())).with_timestamp(ts());
        let out = sensor_avg(&[bare]);
        assert_eq!(out, AggregateSummary::Avg { metric: "sensor.value".into(), value: None });
    }

    #[test]
    fn log_levels_count_missing_as_unknown() {
        let bare = Event::raw(EventSource::Log, Payload::Other(Map::new())).with_timestamp(ts());
        let out = log_level_counts(&[log(LogLevel::Info), log(LogLevel::Error), log(LogLevel::Info), bare]);
        let AggregateSummary::CountByLevel { levels } = out else {
            panic!("expected count_by_level");
        };
        assert_eq!(levels["INFO"], 2);
        assert_eq!(levels["ERROR"], 1);
        assert_eq!(levels["UNKNOWN"], 1);
    }

    #[test]
    fn feed_actions_count_and_rate_successes() {
        let out = feed_action_counts(&[feed("login", true), feed("login", false), feed("click", true)]);
        let AggregateSummary::CountByAction { actions, success_rate } = out else {
            panic!("expected count_by_action");
        };
        assert_eq!(actions["login"], 2);
        assert_eq!(actions["click"], 1);
        assert!((success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_batch_emits_one_event_per_source() {
        let registry = AggregatorRegistry::default();
        let batch = batch(vec![sensor(10.0), log(LogLevel::Info), feed("login", true)]);

        let out = registry.aggregate_batch(&batch).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|e| e.event_type == EventType::Aggregated));

        for event in &out {
            let Payload::Aggregated(payload) = &event.payload else {
                panic!("expected aggregated payload");
            };
            // window bounds come from the batch grid, not the member events
            assert_eq!(payload.window.start, batch.start);
            assert_eq!(payload.window.end, batch.end);
            assert_eq!(payload.window.count, 1);
            match (&event.source, &payload.summary) {
                (EventSource::Sensor, AggregateSummary::Avg { value, .. }) => {
                    assert_eq!(*value, Some(10.0));
                }
                (EventSource::Log, AggregateSummary::CountByLevel { levels }) => {
                    assert_eq!(levels["INFO"], 1);
                }
                (EventSource::Feed, AggregateSummary::CountByAction { success_rate, .. }) => {
                    assert_eq!(*success_rate, 1.0);
                }
                other => panic!("unexpected aggregate pairing: {other:?}"),
            }
        }
    }

    #[test]
    fn aggregate_batch_rejects_empty_windows() {
        let registry = AggregatorRegistry::default();
        let err = registry.aggregate_batch(&batch(vec![])).unwrap_err();
        assert!(matches!(err, EngineError::EmptyWindow));
    }

    #[test]
    fn sources_without_a_reducer_are_skipped() {
        let mut registry = AggregatorRegistry::empty();
        registry.register(EventSource::Log, log_level_counts);
        let out = registry
            .aggregate_batch(&batch(vec![sensor(1.0), log(LogLevel::Debug)]))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, EventSource::Log);
    }

    #[test]
    fn built_in_reducers_can_be_replaced() {
        let mut registry = AggregatorRegistry::default();
        registry.register(EventSource::Sensor, |events| AggregateSummary::Avg {
            metric: "sensor.count".into(),
            value: Some(events.len() as f64),
        });
        let out = registry.aggregate_batch(&batch(vec![sensor(1.0), sensor(2.0)])).unwrap();
        let Payload::Aggregated(payload) = &out[0].payload else { panic!() };
        assert_eq!(
            payload.summary,
            AggregateSummary::Avg { metric: "sensor.count".into(), value: Some(2.0) }
        );
    }
}
