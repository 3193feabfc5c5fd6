//! Driver for the Dyacon CM1 weather station control module.
//!
//! The CM1 exposes its sensors as Modbus holding registers over an RS-485
//! serial line. This crate polls those registers one group at a time,
//! decodes them into named sensor readings, and maps the readings onto the
//! field names a weather-logging host expects:
//!
//! - [`registers`] - Register table and word decoding
//! - [`transport`] - Modbus RTU transport behind the [`Transport`] seam
//! - [`station`] - Raw station access: poll, system block, clock
//! - [`mapper`] - Output field mapping
//! - [`driver`] - Host-facing adapter with rain accounting
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`mock`] - Scripted transport for tests
//!
//! A ready driver comes straight out of [`Cm1Driver::open`]; every failure
//! after that is either a per-cycle communication problem or, once
//! [`Cm1Driver::close`] has been called, an illegal state.

pub mod config;
pub mod driver;
pub mod error;
pub mod mapper;
pub mod mock;
pub mod reading;
pub mod registers;
pub mod station;
pub mod transport;

// Re-export commonly used types at the crate root
pub use config::{Cm1Config, ConfigError, LoggingConfig};
pub use driver::Cm1Driver;
pub use error::{CommunicationError, Error, Result};
pub use mapper::{DEFAULT_MAP, SensorMap};
pub use reading::{PacketRecord, SensorReading, Unit, current_timestamp_secs};
pub use registers::{RegisterGroup, RegisterSpec, WordType};
pub use station::{ChargerStatus, Cm1Station, PollCycle, SystemParameters};
pub use transport::{SerialTransport, Transport, TransportError};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(config: &LoggingConfig) -> std::result::Result<(), ConfigError> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| ConfigError::Validation(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}
