//! Mapping from internal sensor names to host output fields.

use std::collections::{BTreeMap, HashMap};

use crate::config::ConfigError;
use crate::reading::SensorReading;
use crate::registers;

/// Output fields emitted when the operator configures no map of their own,
/// as `(output_field, internal_sensor)` pairs. Field names follow the
/// conventions of common weather-logging software.
pub const DEFAULT_MAP: &[(&str, &str)] = &[
    ("pressure", "pressure"),
    ("outTemp", "temperature"),
    ("outHumidity", "humidity"),
    ("windSpeed", "wind_speed"),
    ("windDir", "wind_dir"),
    ("windGust", "wind_gust_speed"),
    ("windGustDir", "wind_gust_dir"),
    ("rain", "rain"),
    ("rainRate", "rain_rate"),
    ("heatindex", "heatindex"),
    ("windchill", "windchill"),
    ("dewpoint", "dewpoint"),
    ("wetbulb", "wetbulb"),
    ("extraTemp1", "analog_1"),
    ("extraTemp2", "analog_2"),
    ("lightning_disturber_count", "lightning_disturber_count"),
    ("lightning_strike_count", "lightning_strike_count"),
    ("lightning_noise_count", "lightning_noise_count"),
    ("lightning_distance", "lightning_distance"),
    ("lightning_energy", "lightning_energy"),
    ("solar_voltage", "solar_voltage"),
    ("battery_voltage", "battery_voltage"),
    ("charger_status", "charger_status"),
    ("tph_status", "tph_status"),
    ("lightning_status", "lightning_status"),
    ("wind_status", "wind_status"),
];

/// Sensors synthesized by the driver rather than read from a register.
pub const DERIVED_SENSORS: &[&str] = &["rain"];

/// A validated set of `output_field = internal_sensor` pairs.
///
/// Every internal name is checked against the register table (or the derived
/// sensors) at construction, so a typo in a configured map fails at startup
/// instead of silently dropping a field on every packet.
#[derive(Debug, Clone)]
pub struct SensorMap {
    entries: BTreeMap<String, String>,
}

impl SensorMap {
    /// Build a map, rejecting entries that point at unknown sensors.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        let mut entries = BTreeMap::new();
        for (output, internal) in pairs {
            if registers::lookup(&internal).is_none()
                && !DERIVED_SENSORS.contains(&internal.as_str())
            {
                return Err(ConfigError::Validation(format!(
                    "Sensor map entry '{output}': unknown sensor '{internal}'"
                )));
            }
            entries.insert(output, internal);
        }
        Ok(Self { entries })
    }

    /// Project one cycle's readings onto the configured output fields.
    ///
    /// Fields whose sensor produced no reading this cycle are omitted;
    /// readings no entry points at are dropped. When several readings share
    /// a name the last one wins.
    pub fn apply(&self, readings: &[SensorReading]) -> BTreeMap<String, Option<f64>> {
        let mut by_name: HashMap<&str, Option<f64>> = HashMap::new();
        for reading in readings {
            by_name.insert(reading.name, reading.value);
        }
        let mut fields = BTreeMap::new();
        for (output, internal) in &self.entries {
            if let Some(value) = by_name.get(internal.as_str()) {
                fields.insert(output.clone(), *value);
            }
        }
        fields
    }
}
