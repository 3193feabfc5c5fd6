//! Error types for the CM1 driver.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias using the driver's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Driver-level errors, split by how the host should react to them.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration. Fatal at startup, never raised while polling.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The station could not be reached or answered garbage.
    #[error(transparent)]
    Communication(#[from] CommunicationError),

    /// The driver was used outside its ready state.
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),
}

/// Failures talking to the station, tagged with what was being accessed.
#[derive(Debug, Error)]
pub enum CommunicationError {
    /// Opening the serial device failed.
    #[error("Failed to open {port}: {detail}")]
    Open { port: String, detail: String },

    /// A register read failed.
    #[error("Read of {group} registers {address}..+{count} failed: {detail}")]
    Read {
        group: &'static str,
        address: u16,
        count: u16,
        detail: String,
    },

    /// A register write failed.
    #[error("Write at register {address} failed: {detail}")]
    Write { address: u16, detail: String },

    /// The station answered, but with something undecodable.
    #[error("Malformed {what} data: {detail}")]
    Malformed { what: &'static str, detail: String },
}
