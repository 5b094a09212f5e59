//! Vehicle metric table shared between the frame processor and the publisher.
//!
//! Both protocols write into the same metric names, so a snapshot looks the same regardless of which bus produced it.
//! A metric that the bus reported as "not available" is kept with a `None` value and serializes as `null`.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

pub const SPEED: &str = "Speed";
pub const ENGINE_RPM: &str = "EngineRPM";
pub const COOLANT_TEMP: &str = "CoolantTemp";
pub const OIL_PRESSURE: &str = "OilPressure";
pub const ENGINE_LOAD: &str = "EngineLoad";
pub const FUEL_LEVEL: &str = "FuelLevel";
pub const FUEL_RATE: &str = "FuelRate";
pub const BATTERY_VOLTAGE: &str = "BatteryVoltage";
pub const AMBIENT_TEMP: &str = "AmbientTemp";
pub const TOTAL_DISTANCE: &str = "TotalDistance";
pub const LATITUDE: &str = "Latitude";
pub const LONGITUDE: &str = "Longitude";

/// Name of the field appended to every serialized snapshot.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Mapping from metric name to last-known value, guarded by a reader/writer lock.
#[derive(Debug, Default)]
pub struct MetricTable {
    values: RwLock<BTreeMap<String, Option<f64>>>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a metric. `None` marks the metric as not available.
    pub fn set(&self, name: &str, value: Option<f64>) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(name.to_owned(), value);
    }

    /// Last known value of a metric.
    /// Returns `None` both for unknown metrics and for metrics marked not available.
    pub fn get(&self, name: &str) -> Option<f64> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(name).copied().flatten()
    }

    /// Whether the metric was ever written, including as not available.
    pub fn contains(&self, name: &str) -> bool {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent copy of all metrics, stamped with the current time.
    pub fn snapshot(&self) -> MetricSnapshot {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        MetricSnapshot {
            values: values.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Drop every metric.
    pub fn reset(&self) {
        self.values.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Point-in-time copy of a [`MetricTable`]. Serializes as a flat object with an RFC 3339 `timestamp` field appended.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub values: BTreeMap<String, Option<f64>>,
    pub timestamp: DateTime<Utc>,
}

impl MetricSnapshot {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for MetricSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
        map.serialize_entry(TIMESTAMP_FIELD, &timestamp)?;
        map.end()
    }
}
