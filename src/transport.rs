//! Register-level transport to the station.

use std::time::Duration;

use thiserror::Error;
use tokio_modbus::Slave;
use tokio_modbus::client::sync::{Context, Reader, Writer, rtu};
use tracing::debug;

use crate::error::CommunicationError;

/// A failed transport operation, as free text from the underlying client.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Raw register access, the only seam through which the station is touched.
///
/// Production code uses [`SerialTransport`]; tests substitute
/// [`crate::mock::MockTransport`].
pub trait Transport {
    /// Read `count` holding registers starting at `address`.
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, TransportError>;

    /// Write consecutive holding registers starting at `address`.
    fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), TransportError>;
}

/// Modbus RTU over an RS-485 serial line.
pub struct SerialTransport {
    ctx: Context,
}

impl SerialTransport {
    /// Open the serial device and attach to the station's slave address.
    ///
    /// The CM1 speaks 8N1, 19200 baud out of the box.
    pub fn open(
        port: &str,
        baud_rate: u32,
        address: u8,
        timeout: Duration,
    ) -> Result<Self, CommunicationError> {
        let builder = tokio_serial::new(port, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One);
        let ctx = rtu::connect_slave_with_timeout(&builder, Slave(address), Some(timeout))
            .map_err(|e| CommunicationError::Open {
                port: port.to_string(),
                detail: e.to_string(),
            })?;
        debug!("Opened {} at {} baud, slave {}", port, baud_rate, address);
        Ok(Self { ctx })
    }
}

impl Transport for SerialTransport {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        self.ctx
            .read_holding_registers(address, count)
            .map_err(|e| TransportError(e.to_string()))?
            .map_err(|e| TransportError(format!("Device exception: {e:?}")))
    }

    fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), TransportError> {
        self.ctx
            .write_multiple_registers(address, words)
            .map_err(|e| TransportError(e.to_string()))?
            .map_err(|e| TransportError(format!("Device exception: {e:?}")))
    }
}
