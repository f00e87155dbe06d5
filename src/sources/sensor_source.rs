//! Demo sensor producer: gaussian noise around a base value, a slow drift
//! proportional to elapsed wall time, and rare ±10 anomalies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use rand_distr::{Distribution, Normal};

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::event::{Event, EventSource, Payload, SensorPayload};
use crate::signal::StopSignal;
use crate::sources::Source;

pub struct SensorSource {
    bus: Arc<EventBus>,
    stop: StopSignal,
    name: String,
    sensor_id: String,
    metric: String,
    unit: String,
    base_value: f64,
    noise_std: f64,
    drift_per_minute: f64,
    anomaly_probability: f64,
    interval: Duration,
    location: Option<String>,
    current_drift: f64,
    last_drift_update: Instant,
}

impl SensorSource {
    pub fn new(bus: Arc<EventBus>, stop: StopSignal, sensor_id: &str) -> Self {
        Self {
            bus,
            stop,
            name: format!("sensor-source:{sensor_id}"),
            sensor_id: sensor_id.to_string(),
            metric: "temperature".to_string(),
            unit: "°C".to_string(),
            base_value: 20.0,
            noise_std: 0.3,
            drift_per_minute: 0.01,
            anomaly_probability: 0.01,
            interval: Duration::from_secs(1),
            location: None,
            current_drift: 0.0,
            last_drift_update: Instant::now(),
        }
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_profile(
        mut self,
        base_value: f64,
        noise_std: f64,
        drift_per_minute: f64,
        anomaly_probability: f64,
    ) -> Self {
        self.base_value = base_value;
        self.noise_std = noise_std;
        self.drift_per_minute = drift_per_minute;
        self.anomaly_probability = anomaly_probability;
        self
    }

    fn update_drift(&mut self) {
        let now = Instant::now();
        let elapsed_minutes = now.duration_since(self.last_drift_update).as_secs_f64() / 60.0;
        self.current_drift += elapsed_minutes * self.drift_per_minute;
        self.last_drift_update = now;
    }

    fn generate_value(&self) -> f64 {
        let mut rng = rand::rng();
        let noise = Normal::new(0.0, self.noise_std)
            .map(|normal| normal.sample(&mut rng))
            .unwrap_or(0.0);
        let mut value = self.base_value + self.current_drift + noise;
        if rand::random::<f64>() < self.anomaly_probability {
            value += if rand::random::<bool>() { 10.0 } else { -10.0 };
        }
        (value * 1000.0).round() / 1000.0
    }
}

impl Source for SensorSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<(), EngineError> {
        while !self.stop.is_set() {
            self.update_drift();
            let event = Event::raw(
                EventSource::Sensor,
                Payload::Sensor(SensorPayload {
                    sensor_id: self.sensor_id.clone(),
                    metric: self.metric.clone(),
                    value: self.generate_value(),
                    unit: self.unit.clone(),
                    location: self.location.clone(),
                }),
            )
            .with_tag("metric", &self.metric)
            .with_tag("sensor_id", &self.sensor_id);

            self.bus.publish(event);
            self.stop.sleep(self.interval);
        }
        debug!("[{}] stopped", self.name());
        Ok(())
    }
}
