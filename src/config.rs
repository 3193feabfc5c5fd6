//! Configuration for the CM1 driver.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::mapper::DEFAULT_MAP;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete driver configuration.
///
/// Every field has a default matching a stock MS-120 installation, so an
/// empty config polls a station on `/dev/ttyUSB0` out of the box. Unknown
/// keys are rejected at parse time; with everything defaulted, a typo would
/// otherwise silently configure something else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cm1Config {
    /// Station model carried in logs and reports
    #[serde(default = "default_model")]
    pub model: String,

    /// Serial port of the RS-485 adapter
    #[serde(default = "default_port")]
    pub port: String,

    /// Modbus slave address (1-247)
    #[serde(default = "default_address")]
    pub address: u8,

    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Serial read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Seconds between polls in the watch loop
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Rain gauge bucket size in millimetres per tip
    #[serde(default = "default_bucket_size")]
    pub bucket_size_mm: f64,

    /// Extra `output_field: internal_sensor` pairs, merged over the
    /// default map
    #[serde(default)]
    pub sensor_map: HashMap<String, String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_model() -> String {
    "MS-120".to_string()
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_address() -> u8 {
    1
}

fn default_baud_rate() -> u32 {
    19200
}

fn default_timeout_ms() -> u64 {
    6000
}

fn default_poll_interval() -> u64 {
    10
}

fn default_bucket_size() -> f64 {
    0.2
}

impl Default for Cm1Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            port: default_port(),
            address: default_address(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            poll_interval_secs: default_poll_interval(),
            bucket_size_mm: default_bucket_size(),
            sensor_map: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Cm1Config {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Cm1Config = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Sensor map targets are checked separately when the map is built,
    /// against the register table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.is_empty() {
            return Err(ConfigError::Validation(
                "Serial port cannot be empty".to_string(),
            ));
        }

        if self.address == 0 || self.address > 247 {
            return Err(ConfigError::Validation(format!(
                "Invalid slave address {} (must be 1-247)",
                self.address
            )));
        }

        if self.baud_rate == 0 {
            return Err(ConfigError::Validation(
                "Baud rate must be non-zero".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be non-zero".to_string(),
            ));
        }

        if !self.bucket_size_mm.is_finite() || self.bucket_size_mm <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "Invalid bucket size {} (must be positive)",
                self.bucket_size_mm
            )));
        }

        Ok(())
    }

    /// The default sensor map with the operator's entries merged on top.
    pub fn merged_sensor_map(&self) -> BTreeMap<String, String> {
        let mut merged: BTreeMap<String, String> = DEFAULT_MAP
            .iter()
            .map(|(output, internal)| (output.to_string(), internal.to_string()))
            .collect();
        merged.extend(
            self.sensor_map
                .iter()
                .map(|(output, internal)| (output.clone(), internal.clone())),
        );
        merged
    }
}
