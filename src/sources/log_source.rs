//! Demo log producer: weighted random levels with occasional burst ticks.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::event::{Event, EventSource, LogLevel, LogPayload, Payload};
use crate::signal::StopSignal;
use crate::sources::Source;

// Weights line up with LogLevel::ALL: DEBUG .. CRITICAL.
const LEVEL_WEIGHTS: [f64; 5] = [0.40, 0.35, 0.15, 0.08, 0.02];

pub struct LogSource {
    bus: Arc<EventBus>,
    stop: StopSignal,
    service: String,
    host: String,
    base_interval: Duration,
    burst_interval: Duration,
    burst_probability: f64,
}

impl LogSource {
    pub fn new(bus: Arc<EventBus>, stop: StopSignal, service: &str, host: &str) -> Self {
        Self {
            bus,
            stop,
            service: service.to_string(),
            host: host.to_string(),
            base_interval: Duration::from_millis(1500),
            burst_interval: Duration::from_millis(200),
            burst_probability: 0.1,
        }
    }

    pub fn with_intervals(
        mut self,
        base_interval: Duration,
        burst_interval: Duration,
        burst_probability: f64,
    ) -> Self {
        self.base_interval = base_interval;
        self.burst_interval = burst_interval;
        self.burst_probability = burst_probability;
        self
    }

    fn choose_level(&self) -> LogLevel {
        let roll: f64 = rand::random_range(0.0..1.0);
        let mut cumulative = 0.0;
        for (level, weight) in LogLevel::ALL.into_iter().zip(LEVEL_WEIGHTS) {
            cumulative += weight;
            if roll < cumulative {
                return level;
            }
        }
        LogLevel::Critical
    }

    fn message_for(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Debug => "Debugging internal state",
            LogLevel::Info => "Operation completed successfully",
            LogLevel::Warning => "Potential issue detected",
            LogLevel::Error => "Error while processing request",
            LogLevel::Critical => "System failure",
        }
    }

    fn next_interval(&self) -> Duration {
        if rand::random::<f64>() < self.burst_probability {
            self.burst_interval
        } else {
            self.base_interval
        }
    }
}

impl Source for LogSource {
    fn name(&self) -> &str {
        "log-source"
    }

    fn run(&mut self) -> Result<(), EngineError> {
        while !self.stop.is_set() {
            let level = self.choose_level();
            let event = Event::raw(
                EventSource::Log,
                Payload::Log(LogPayload {
                    level,
                    message: Self::message_for(level).to_string(),
                    service: self.service.clone(),
                    host: self.host.clone(),
                }),
            )
            .with_tag("service", &self.service)
            .with_tag("level", level.as_str());

            self.bus.publish(event);
            self.stop.sleep(self.next_interval());
        }
        debug!("[{}] stopped", self.name());
        Ok(())
    }
}
