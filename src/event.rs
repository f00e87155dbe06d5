//! Event model: immutable event records plus the tagged source/kind enums
//! and the per-source payload shapes that flow through the bus and pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Log,
    Sensor,
    Feed,
}

impl EventSource {
    pub const ALL: [EventSource; 3] = [EventSource::Log, EventSource::Sensor, EventSource::Feed];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Log => "log",
            EventSource::Sensor => "sensor",
            EventSource::Feed => "feed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Raw,
    Aggregated,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    pub level: LogLevel,
    pub message: String,
    pub service: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    pub sensor_id: String,
    pub metric: String,
    pub value: f64,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPayload {
    pub user_id: String,
    pub action: String,
    pub resource: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Grid-aligned bounds of the window an aggregate was computed over.
/// `count` is the number of events in the aggregated partition, not in the
/// whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMeta {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
}

/// Summary part of an aggregated payload, tagged by the `aggregation` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregation", rename_all = "snake_case")]
pub enum AggregateSummary {
    /// Mean of the numeric sensor values; `None` when every value was absent.
    Avg { metric: String, value: Option<f64> },
    CountByLevel {
        levels: BTreeMap<String, u64>,
    },
    CountByAction {
        actions: BTreeMap<String, u64>,
        success_rate: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPayload {
    #[serde(flatten)]
    pub summary: AggregateSummary,
    pub window: WindowMeta,
}

/// Payload sum over the known source kinds plus a free-form map fallback for
/// events produced outside the built-in sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Log(LogPayload),
    Sensor(SensorPayload),
    Feed(FeedPayload),
    Aggregated(AggregatedPayload),
    Other(Map<String, Value>),
}

impl Payload {
    /// Numeric sensor value, if present in either the typed or map form.
    pub fn sensor_value(&self) -> Option<f64> {
        match self {
            Payload::Sensor(p) => Some(p.value),
            Payload::Other(map) => map.get("value").and_then(Value::as_f64),
            _ => None,
        }
    }

    pub fn log_level(&self) -> Option<&str> {
        match self {
            Payload::Log(p) => Some(p.level.as_str()),
            Payload::Other(map) => map.get("level").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn feed_action(&self) -> Option<&str> {
        match self {
            Payload::Feed(p) => Some(&p.action),
            Payload::Other(map) => map.get("action").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn feed_success(&self) -> Option<bool> {
        match self {
            Payload::Feed(p) => Some(p.success),
            Payload::Other(map) => map.get("success").and_then(Value::as_bool),
            _ => None,
        }
    }
}

/// Immutable unit of data flowing through the engine. Fields are never
/// mutated after construction; the builder methods return modified copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub source: EventSource,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Event {
    /// Fresh raw event stamped with a v4 id and the current UTC time.
    pub fn raw(source: EventSource, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            event_type: EventType::Raw,
            timestamp: Utc::now(),
            payload,
            tags: BTreeMap::new(),
            correlation_id: None,
        }
    }

    /// Aggregate event carrying a window summary for `source`.
    pub fn aggregated(source: EventSource, payload: AggregatedPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            event_type: EventType::Aggregated,
            timestamp: Utc::now(),
            payload: Payload::Aggregated(payload),
            tags: BTreeMap::new(),
            correlation_id: None,
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }
}
