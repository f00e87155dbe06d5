//! Demo activity-feed producer: uniform picks over users/actions/resources
//! with a 0.9 success ratio and a uniformly random inter-event interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::debug;
use rand::seq::IndexedRandom;
use serde_json::{Map, Value};

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::event::{Event, EventSource, FeedPayload, Payload};
use crate::signal::StopSignal;
use crate::sources::Source;

pub struct FeedSource {
    bus: Arc<EventBus>,
    stop: StopSignal,
    users: Vec<String>,
    actions: Vec<String>,
    resources: Vec<String>,
    interval_range: (Duration, Duration),
}

impl FeedSource {
    pub fn new(
        bus: Arc<EventBus>,
        stop: StopSignal,
        users: Vec<String>,
        actions: Vec<String>,
        resources: Vec<String>,
    ) -> Self {
        Self {
            bus,
            stop,
            users,
            actions,
            resources,
            interval_range: (Duration::from_secs(2), Duration::from_secs(4)),
        }
    }

    pub fn with_interval_range(mut self, min: Duration, max: Duration) -> Self {
        self.interval_range = (min, max.max(min));
        self
    }

    fn pick(values: &[String]) -> &str {
        values.choose(&mut rand::rng()).map(String::as_str).unwrap_or("unknown")
    }

    fn next_interval(&self) -> Duration {
        let (min, max) = self.interval_range;
        Duration::from_secs_f64(rand::random_range(min.as_secs_f64()..=max.as_secs_f64()))
    }

    fn build_event(&self) -> Event {
        let action = Self::pick(&self.actions).to_string();
        let success = rand::random::<f64>() > 0.1;

        let mut metadata = Map::new();
        metadata.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));

        Event::raw(
            EventSource::Feed,
            Payload::Feed(FeedPayload {
                user_id: Self::pick(&self.users).to_string(),
                action: action.clone(),
                resource: Self::pick(&self.resources).to_string(),
                success,
                metadata,
            }),
        )
        .with_tag("action", &action)
        .with_tag("success", if success { "true" } else { "false" })
    }
}

impl Source for FeedSource {
    fn name(&self) -> &str {
        "feed-source"
    }

    fn run(&mut self) -> Result<(), EngineError> {
        while !self.stop.is_set() {
            self.bus.publish(self.build_event());
            self.stop.sleep(self.next_interval());
        }
        debug!("[{}] stopped", self.name());
        Ok(())
    }
}
