//! Host-facing driver: sensor map, rain accounting, timestamped packets.

use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::Cm1Config;
use crate::error::{Error, Result};
use crate::mapper::SensorMap;
use crate::reading::{PacketRecord, SensorReading, Unit, current_timestamp_secs};
use crate::station::{Cm1Station, PollCycle};
use crate::transport::{SerialTransport, Transport};

/// Adapter between a [`Cm1Station`] and a weather-logging host.
///
/// On top of the raw station it applies the configured sensor map, converts
/// the rain counters into depths using the gauge's bucket size, and stamps
/// every packet with the time it was taken. A driver is ready as soon as
/// construction returns and stays so until [`Cm1Driver::close`].
pub struct Cm1Driver<T> {
    station: Option<Cm1Station<T>>,
    map: SensorMap,
    model: String,
    bucket_size_mm: f64,
    last_rain_total: Option<f64>,
}

impl Cm1Driver<SerialTransport> {
    /// Open the configured serial port and initialize the driver against it.
    pub fn open(config: &Cm1Config) -> Result<Self> {
        config.validate()?;
        let transport = SerialTransport::open(
            &config.port,
            config.baud_rate,
            config.address,
            Duration::from_millis(config.timeout_ms),
        )?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Cm1Driver<T> {
    /// Initialize the driver over an already-open transport.
    ///
    /// Validates the configuration and the sensor map, then probes the
    /// station's system block so a dead link is caught here rather than on
    /// the first poll.
    pub fn with_transport(config: &Cm1Config, transport: T) -> Result<Self> {
        config.validate()?;
        let map = SensorMap::new(config.merged_sensor_map())?;

        info!("Driver version {}", env!("CARGO_PKG_VERSION"));
        info!("Model: {}", config.model);
        info!("Bucket size: {} mm", config.bucket_size_mm);
        debug!("Sensor map: {:?}", map);

        let mut station = Cm1Station::new(transport);
        let params = station.system_parameters()?;
        info!("Product id: {}", params.product_id);
        info!("Firmware version: {}", params.firmware_version);
        info!("Serial number: {}", params.serial_number);
        info!(
            "Battery: {:.3} V, solar: {:.3} V, charger: {}",
            params.battery_voltage, params.solar_voltage, params.charger_status
        );

        Ok(Self {
            station: Some(station),
            map,
            model: config.model.clone(),
            bucket_size_mm: config.bucket_size_mm,
            last_rain_total: None,
        })
    }

    /// Poll the station once and map the result into a packet.
    ///
    /// Register groups that fail to read drop out of the packet for this
    /// cycle; the call fails only when the whole station is unreachable.
    pub fn get_reading(&mut self) -> Result<PacketRecord> {
        let station = self
            .station
            .as_mut()
            .ok_or(Error::IllegalState("driver is closed"))?;
        let PollCycle { readings, failures } = station.poll()?;
        if !failures.is_empty() {
            debug!("{} register groups skipped this cycle", failures.len());
        }
        let readings = self.finish_cycle(readings);
        let fields = self.map.apply(&readings);
        Ok(PacketRecord::new(current_timestamp_secs(), fields))
    }

    /// Read the station clock.
    pub fn station_clock(&mut self) -> Result<NaiveDateTime> {
        Ok(self.station_mut()?.clock()?)
    }

    /// Set the station clock to `when` (local time).
    pub fn sync_clock(&mut self, when: NaiveDateTime) -> Result<()> {
        Ok(self.station_mut()?.set_clock(when)?)
    }

    /// Station model, as configured.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_open(&self) -> bool {
        self.station.is_some()
    }

    /// Release the transport. Polling afterwards fails with an illegal
    /// state error. Closing an already-closed driver does nothing.
    pub fn close(&mut self) {
        if self.station.take().is_some() {
            info!("Driver closed");
        }
    }

    /// Convert rain counters to depths and derive the per-cycle rainfall
    /// from the day counter's movement.
    fn finish_cycle(&mut self, readings: Vec<SensorReading>) -> Vec<SensorReading> {
        let mut out = Vec::with_capacity(readings.len() + 1);
        let mut day_total = None;
        for reading in readings {
            match reading.name {
                "rain_rate" => out.push(SensorReading::new(
                    "rain_rate",
                    reading.value.map(|v| v * self.bucket_size_mm),
                    Unit::MillimetersPerHour,
                )),
                "rain_day_total" => {
                    day_total = reading.value;
                    out.push(reading);
                }
                _ => out.push(reading),
            }
        }
        if let Some(total) = day_total {
            let depth = match self.last_rain_total {
                Some(prev) if total >= prev => Some((total - prev) * self.bucket_size_mm),
                // counter went backwards (midnight reset), no depth this cycle
                Some(_) => None,
                // first cycle has no baseline
                None => None,
            };
            out.push(SensorReading::new("rain", depth, Unit::Millimeters));
            self.last_rain_total = Some(total);
        }
        out
    }

    fn station_mut(&mut self) -> Result<&mut Cm1Station<T>> {
        self.station
            .as_mut()
            .ok_or(Error::IllegalState("driver is closed"))
    }
}
