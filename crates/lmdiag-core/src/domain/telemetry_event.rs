//! Telemetry event type

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arbitrary event properties, ordered by key.
pub type Properties = Map<String, Value>;

/// Numeric event measurements, ordered by key.
pub type Measurements = BTreeMap<String, f64>;

/// A structured usage event buffered by the telemetry manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub measurements: Measurements,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>, properties: Properties, measurements: Measurements) -> Self {
        Self {
            name: name.into(),
            properties,
            measurements,
            timestamp: Utc::now(),
        }
    }

    /// Event with no properties or measurements.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Properties::new(), Measurements::new())
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_measurement(mut self, key: impl Into<String>, value: f64) -> Self {
        self.measurements.insert(key.into(), value);
        self
    }
}
