//! Sensor reading and packet data model.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Measurement unit of a decoded sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Celsius,
    Percent,
    HectoPascal,
    MetersPerSecond,
    Degrees,
    Volts,
    Kilometers,
    Millimeters,
    MillimetersPerHour,
    Tips,
    TipsPerHour,
    Count,
    /// Dimensionless (status words, raw analog channels).
    None,
}

impl Unit {
    /// Short unit suffix for display, empty when dimensionless.
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
            Unit::Percent => "%",
            Unit::HectoPascal => "hPa",
            Unit::MetersPerSecond => "m/s",
            Unit::Degrees => "°",
            Unit::Volts => "V",
            Unit::Kilometers => "km",
            Unit::Millimeters => "mm",
            Unit::MillimetersPerHour => "mm/h",
            Unit::Tips => "tips",
            Unit::TipsPerHour => "tips/h",
            Unit::Count => "count",
            Unit::None => "",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single decoded sensor value.
///
/// `value` is `None` when the station reported the sensor as faulted or the
/// reading as unavailable. A sensor that is not attached at all produces no
/// reading in the first place.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Internal sensor name, e.g. `wind_speed`.
    pub name: &'static str,
    /// Decoded value in `unit`, or `None` when unavailable.
    pub value: Option<f64>,
    /// Unit of the decoded value.
    pub unit: Unit,
}

impl SensorReading {
    pub fn new(name: &'static str, value: Option<f64>, unit: Unit) -> Self {
        Self { name, value, unit }
    }
}

/// One polling cycle's worth of mapped output fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Unix timestamp (seconds) taken when the cycle completed.
    pub timestamp: i64,
    /// Output field name to value. `None` marks a field whose sensor
    /// reported but had no usable value this cycle.
    pub fields: BTreeMap<String, Option<f64>>,
}

impl PacketRecord {
    pub fn new(timestamp: i64, fields: BTreeMap<String, Option<f64>>) -> Self {
        Self { timestamp, fields }
    }
}

/// Current Unix time in whole seconds.
pub fn current_timestamp_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
