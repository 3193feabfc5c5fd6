//! Raw access to one CM1 control module.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CommunicationError;
use crate::reading::{SensorReading, Unit};
use crate::registers::{
    self, CLOCK_ADDRESS, CLOCK_WORDS, LIGHTNING_NO_SENSOR, RegisterGroup, STATUS_NO_SENSOR,
    SYSTEM_ADDRESS, SYSTEM_WORDS, TPH_FAULT_PRESSURE, TPH_FAULT_TH, split_u32, word_pair_u32,
};
use crate::transport::Transport;

/// Battery charger state reported in the system block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerStatus {
    Off,
    /// Current-limited charge.
    Fast,
    /// Voltage-limited charge.
    FastTop,
    /// Low-voltage maintenance charge.
    FloatCharge,
    Unknown(u16),
}

impl ChargerStatus {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => ChargerStatus::Off,
            1 => ChargerStatus::Fast,
            2 => ChargerStatus::FastTop,
            3 => ChargerStatus::FloatCharge,
            other => ChargerStatus::Unknown(other),
        }
    }
}

impl std::fmt::Display for ChargerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChargerStatus::Off => write!(f, "Off"),
            ChargerStatus::Fast => write!(f, "Fast"),
            ChargerStatus::FastTop => write!(f, "Fast Top"),
            ChargerStatus::FloatCharge => write!(f, "Float Charge"),
            ChargerStatus::Unknown(raw) => write!(f, "Unknown ({raw})"),
        }
    }
}

impl Serialize for ChargerStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Station identity and health, from the block at register 100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemParameters {
    pub product_id: i16,
    pub firmware_version: u16,
    pub serial_number: u32,
    /// Station clock time as decimal HHMMSS.
    pub station_time: u32,
    /// Station clock date as decimal YYMMDD.
    pub station_date: u32,
    /// Volts.
    pub battery_voltage: f64,
    /// Volts.
    pub solar_voltage: f64,
    pub charger_status: ChargerStatus,
}

/// Everything one polling cycle produced.
#[derive(Debug)]
pub struct PollCycle {
    /// Decoded readings from the groups that answered.
    pub readings: Vec<SensorReading>,
    /// Read errors from the groups that did not.
    pub failures: Vec<CommunicationError>,
}

/// One CM1 control module behind a [`Transport`].
pub struct Cm1Station<T> {
    transport: T,
}

impl<T: Transport> Cm1Station<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Read and decode every register group once.
    ///
    /// A group that fails to read is logged and recorded in the cycle's
    /// `failures` while the rest of the cycle carries on. The cycle itself
    /// is an error only when every group fails.
    pub fn poll(&mut self) -> Result<PollCycle, CommunicationError> {
        let mut readings = Vec::new();
        let mut failures = Vec::new();

        for group in RegisterGroup::ALL {
            match self.read_range(group.name(), group.address(), group.word_count()) {
                Ok(words) => readings.extend(decode_group(group, &words)),
                Err(e) => {
                    warn!("{}", e);
                    failures.push(e);
                }
            }
        }

        if failures.len() == RegisterGroup::ALL.len() {
            return Err(failures.swap_remove(0));
        }

        Ok(PollCycle { readings, failures })
    }

    /// Read the system parameter block.
    pub fn system_parameters(&mut self) -> Result<SystemParameters, CommunicationError> {
        let words = self.read_range("system", SYSTEM_ADDRESS, SYSTEM_WORDS)?;
        Ok(SystemParameters {
            product_id: words[0] as i16,
            firmware_version: words[1],
            serial_number: word_pair_u32(words[2], words[3]),
            station_time: word_pair_u32(words[4], words[5]),
            station_date: word_pair_u32(words[6], words[7]),
            battery_voltage: f64::from(words[8]) * 0.001,
            solar_voltage: f64::from(words[9]) * 0.001,
            charger_status: ChargerStatus::from_raw(words[10]),
        })
    }

    /// Read the station clock. The station keeps local time.
    pub fn clock(&mut self) -> Result<NaiveDateTime, CommunicationError> {
        let words = self.read_range("clock", CLOCK_ADDRESS, CLOCK_WORDS)?;
        let time = word_pair_u32(words[0], words[1]);
        let date = word_pair_u32(words[2], words[3]);
        debug!("get_clock: {:06}.{:06}", date, time);
        NaiveDate::from_ymd_opt(2000 + (date / 10_000) as i32, date / 100 % 100, date % 100)
            .and_then(|d| d.and_hms_opt(time / 10_000, time / 100 % 100, time % 100))
            .ok_or_else(|| CommunicationError::Malformed {
                what: "clock",
                detail: format!("invalid station date/time {date:06}.{time:06}"),
            })
    }

    /// Set the station clock. `when` must be local time in 2000-2099.
    pub fn set_clock(&mut self, when: NaiveDateTime) -> Result<(), CommunicationError> {
        if !(2000..=2099).contains(&when.year()) {
            return Err(CommunicationError::Malformed {
                what: "clock",
                detail: format!("year {} outside the station's 2000-2099 range", when.year()),
            });
        }
        let date = (when.year() as u32 - 2000) * 10_000 + when.month() * 100 + when.day();
        let time = when.hour() * 10_000 + when.minute() * 100 + when.second();
        let (time_hi, time_lo) = split_u32(time);
        let (date_hi, date_lo) = split_u32(date);
        debug!("set_clock: {:06}.{:06}", date, time);
        self.transport
            .write_registers(CLOCK_ADDRESS, &[time_hi, time_lo, date_hi, date_lo])
            .map_err(|e| CommunicationError::Write {
                address: CLOCK_ADDRESS,
                detail: e.to_string(),
            })
    }

    fn read_range(
        &mut self,
        what: &'static str,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, CommunicationError> {
        let words = self.transport.read_registers(address, count).map_err(|e| {
            CommunicationError::Read {
                group: what,
                address,
                count,
                detail: e.to_string(),
            }
        })?;
        if words.len() != count as usize {
            return Err(CommunicationError::Malformed {
                what,
                detail: format!("expected {} words, got {}", count, words.len()),
            });
        }
        Ok(words)
    }
}

fn decode_group(group: RegisterGroup, words: &[u16]) -> Vec<SensorReading> {
    match group {
        RegisterGroup::Wind => decode_wind(words),
        RegisterGroup::Tph => decode_tph(words),
        RegisterGroup::Lightning => decode_lightning(words),
        _ => registers::group_specs(group)
            .map(|spec| {
                SensorReading::new(spec.name, registers::decode_value(spec, words), spec.unit)
            })
            .collect(),
    }
}

/// Wind values are only valid while the status word is zero. A status of -1
/// means no anemometer is attached, so nothing beyond the status is emitted.
fn decode_wind(words: &[u16]) -> Vec<SensorReading> {
    let status = words[0] as i16;
    let mut readings = vec![SensorReading::new(
        "wind_status",
        Some(f64::from(status)),
        Unit::None,
    )];
    if status == STATUS_NO_SENSOR {
        return readings;
    }
    let healthy = status == 0;
    for spec in registers::group_specs(RegisterGroup::Wind).filter(|spec| spec.offset != 0) {
        let value = if healthy {
            registers::decode_value(spec, words)
        } else {
            None
        };
        readings.push(SensorReading::new(spec.name, value, spec.unit));
    }
    readings
}

/// The TPH status word carries one fault bit per element: bit 0 for the
/// temperature/humidity element, bit 1 for the pressure element.
fn decode_tph(words: &[u16]) -> Vec<SensorReading> {
    let status = words[0] as i16;
    let mut readings = vec![SensorReading::new(
        "tph_status",
        Some(f64::from(status)),
        Unit::None,
    )];
    if status == STATUS_NO_SENSOR {
        return readings;
    }
    for spec in registers::group_specs(RegisterGroup::Tph).filter(|spec| spec.offset != 0) {
        let healthy = match spec.name {
            "temperature" | "humidity" => status & TPH_FAULT_TH == 0,
            _ => status & TPH_FAULT_PRESSURE == 0,
        };
        let value = if healthy {
            registers::decode_value(spec, words)
        } else {
            None
        };
        readings.push(SensorReading::new(spec.name, value, spec.unit));
    }
    readings
}

fn decode_lightning(words: &[u16]) -> Vec<SensorReading> {
    let status = words[0];
    let mut readings = vec![SensorReading::new(
        "lightning_status",
        Some(f64::from(status)),
        Unit::None,
    )];
    let healthy = status != LIGHTNING_NO_SENSOR;
    for spec in registers::group_specs(RegisterGroup::Lightning).filter(|spec| spec.offset != 0) {
        let value = if healthy {
            registers::decode_value(spec, words)
        } else {
            None
        };
        readings.push(SensorReading::new(spec.name, value, spec.unit));
    }
    readings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::registers::REGISTER_TABLE;

    /// A bank with every sensor attached and healthy. Wind speed 3.2 m/s,
    /// 21.5 °C, 1013.2 hPa, wind chill unavailable, 7 bucket tips today.
    fn healthy_bank() -> MockTransport {
        let mock = MockTransport::new();
        mock.set_words(
            100,
            &[120, 205, 0x0001, 0x0002, 0x0002, 0x2E9D, 0x0002, 0x748C, 12_600, 13_800, 1],
        );
        mock.set_words(108, &[12_600, 13_800, 1]);
        mock.set_words(200, &[0, 32, 1450, 28, 1400, 30, 1430, 51, 1500]);
        mock.set_words(220, &[0, 215, 580, 10_132, 1, 220]);
        mock.set_words(240, &[220, 0xD8FA]);
        mock.set_words(242, &[7, 5]);
        mock.set_words(244, &[0x0000, 0x803F, 0x79E9, 0xF642]);
        mock.set_words(248, &[125, 150]);
        mock.set_words(280, &[0, 3, 1, 0, 12, 0x0001, 0x0002, 2, 3, 3, 1, 0]);
        mock
    }

    fn value_of(cycle: &PollCycle, name: &str) -> Option<f64> {
        cycle
            .readings
            .iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("no reading named {name}"))
            .value
    }

    fn has_reading(cycle: &PollCycle, name: &str) -> bool {
        cycle.readings.iter().any(|r| r.name == name)
    }

    fn assert_close(value: Option<f64>, expected: f64) {
        let v = value.expect("reading unavailable");
        assert!((v - expected).abs() < 1e-6, "{v} != {expected}");
    }

    #[test]
    fn test_poll_decodes_every_group() {
        let mut station = Cm1Station::new(healthy_bank());
        let cycle = station.poll().unwrap();

        assert!(cycle.failures.is_empty());
        assert_eq!(cycle.readings.len(), REGISTER_TABLE.len());

        assert_close(value_of(&cycle, "battery_voltage"), 12.6);
        assert_close(value_of(&cycle, "solar_voltage"), 13.8);
        assert_close(value_of(&cycle, "charger_status"), 1.0);
        assert_close(value_of(&cycle, "wind_speed"), 3.2);
        assert_close(value_of(&cycle, "wind_dir"), 145.0);
        assert_close(value_of(&cycle, "wind_gust_speed"), 5.1);
        assert_close(value_of(&cycle, "temperature"), 21.5);
        assert_close(value_of(&cycle, "humidity"), 58.0);
        assert_close(value_of(&cycle, "pressure"), 1013.2);
        assert_close(value_of(&cycle, "heatindex"), 22.0);
        assert_eq!(value_of(&cycle, "windchill"), None);
        assert_close(value_of(&cycle, "dewpoint"), 12.5);
        assert_close(value_of(&cycle, "wetbulb"), 15.0);
        assert_close(value_of(&cycle, "rain_day_total"), 7.0);
        assert_close(value_of(&cycle, "rain_rate"), 5.0);
        assert_close(value_of(&cycle, "analog_1"), 1.0);
        let analog_2 = value_of(&cycle, "analog_2").unwrap();
        assert!((analog_2 - 123.456).abs() < 0.001);
        assert_close(value_of(&cycle, "lightning_strike_count"), 3.0);
        assert_close(value_of(&cycle, "lightning_energy"), 65_538.0);
        assert_close(value_of(&cycle, "lightning_distance"), 12.0);
    }

    #[test]
    fn test_wind_absent_reports_status_only() {
        let mock = healthy_bank();
        mock.set_words(200, &[0xFFFF, 32, 1450, 28, 1400, 30, 1430, 51, 1500]);
        let mut station = Cm1Station::new(mock);
        let cycle = station.poll().unwrap();

        assert_close(value_of(&cycle, "wind_status"), -1.0);
        assert!(!has_reading(&cycle, "wind_speed"));
        assert!(!has_reading(&cycle, "wind_gust_dir"));
        // the rest of the cycle is untouched
        assert_close(value_of(&cycle, "temperature"), 21.5);
    }

    #[test]
    fn test_wind_fault_blanks_values() {
        let mock = healthy_bank();
        mock.set_words(200, &[2, 32, 1450, 28, 1400, 30, 1430, 51, 1500]);
        let mut station = Cm1Station::new(mock);
        let cycle = station.poll().unwrap();

        assert_close(value_of(&cycle, "wind_status"), 2.0);
        assert_eq!(value_of(&cycle, "wind_speed"), None);
        assert_eq!(value_of(&cycle, "wind_dir"), None);
    }

    #[test]
    fn test_tph_th_fault_spares_pressure() {
        let mock = healthy_bank();
        mock.set_words(220, &[1, 215, 580, 10_132, 1, 220]);
        let mut station = Cm1Station::new(mock);
        let cycle = station.poll().unwrap();

        assert_eq!(value_of(&cycle, "temperature"), None);
        assert_eq!(value_of(&cycle, "humidity"), None);
        assert_close(value_of(&cycle, "pressure"), 1013.2);
        assert_close(value_of(&cycle, "temperature_p"), 22.0);
    }

    #[test]
    fn test_tph_pressure_fault_spares_th() {
        let mock = healthy_bank();
        mock.set_words(220, &[2, 215, 580, 10_132, 1, 220]);
        let mut station = Cm1Station::new(mock);
        let cycle = station.poll().unwrap();

        assert_close(value_of(&cycle, "temperature"), 21.5);
        assert_eq!(value_of(&cycle, "pressure"), None);
        assert_eq!(value_of(&cycle, "pressure_trend"), None);
        assert_eq!(value_of(&cycle, "temperature_p"), None);
    }

    #[test]
    fn test_tph_absent_reports_status_only() {
        let mock = healthy_bank();
        mock.set_words(220, &[0xFFFF, 215, 580, 10_132, 1, 220]);
        let mut station = Cm1Station::new(mock);
        let cycle = station.poll().unwrap();

        assert_close(value_of(&cycle, "tph_status"), -1.0);
        assert!(!has_reading(&cycle, "temperature"));
        assert!(!has_reading(&cycle, "pressure"));
    }

    #[test]
    fn test_lightning_absent_blanks_counters() {
        let mock = healthy_bank();
        mock.set_words(280, &[0x0080, 3, 1, 0, 12, 0x0001, 0x0002, 2, 3, 3, 1, 0]);
        let mut station = Cm1Station::new(mock);
        let cycle = station.poll().unwrap();

        assert_close(value_of(&cycle, "lightning_status"), 128.0);
        assert_eq!(value_of(&cycle, "lightning_strike_count"), None);
        assert_eq!(value_of(&cycle, "lightning_energy"), None);
        assert_eq!(value_of(&cycle, "lightning_distance"), None);
    }

    #[test]
    fn test_group_failure_keeps_cycle_going() {
        let mock = healthy_bank();
        mock.fail_read(200);
        let mut station = Cm1Station::new(mock);
        let cycle = station.poll().unwrap();

        assert_eq!(cycle.failures.len(), 1);
        assert!(matches!(
            cycle.failures[0],
            CommunicationError::Read { group: "wind", .. }
        ));
        assert!(!has_reading(&cycle, "wind_status"));
        assert_close(value_of(&cycle, "temperature"), 21.5);
    }

    #[test]
    fn test_all_groups_failing_is_an_error() {
        let mock = healthy_bank();
        mock.fail_all();
        let mut station = Cm1Station::new(mock);
        assert!(station.poll().is_err());
    }

    #[test]
    fn test_truncated_read_is_malformed() {
        let mock = healthy_bank();
        mock.truncate_read(220);
        let mut station = Cm1Station::new(mock);
        let cycle = station.poll().unwrap();

        assert_eq!(cycle.failures.len(), 1);
        assert!(matches!(
            cycle.failures[0],
            CommunicationError::Malformed { what: "tph", .. }
        ));
        assert!(!has_reading(&cycle, "temperature"));
    }

    #[test]
    fn test_system_parameters() {
        let mut station = Cm1Station::new(healthy_bank());
        let params = station.system_parameters().unwrap();

        assert_eq!(params.product_id, 120);
        assert_eq!(params.firmware_version, 205);
        assert_eq!(params.serial_number, 65_538);
        assert_eq!(params.station_time, 143_005);
        assert_eq!(params.station_date, 160_908);
        assert!((params.battery_voltage - 12.6).abs() < 1e-6);
        assert!((params.solar_voltage - 13.8).abs() < 1e-6);
        assert_eq!(params.charger_status, ChargerStatus::Fast);
    }

    #[test]
    fn test_clock_round_trip() {
        let mock = healthy_bank();
        let mut station = Cm1Station::new(mock.clone());

        let clock = station.clock().unwrap();
        let expected = NaiveDate::from_ymd_opt(2016, 9, 8)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap();
        assert_eq!(clock, expected);

        station.set_clock(expected).unwrap();
        assert_eq!(
            mock.writes(),
            vec![(104, vec![0x0002, 0x2E9D, 0x0002, 0x748C])]
        );
        // the bank now holds what was written, so the clock reads back
        assert_eq!(station.clock().unwrap(), expected);
    }

    #[test]
    fn test_garbage_clock_is_malformed() {
        let mock = healthy_bank();
        // month 13
        let (hi, lo) = split_u32(161_305);
        mock.set_words(106, &[hi, lo]);
        let mut station = Cm1Station::new(mock);
        assert!(matches!(
            station.clock(),
            Err(CommunicationError::Malformed { what: "clock", .. })
        ));
    }

    #[test]
    fn test_set_clock_rejects_out_of_range_year() {
        let mut station = Cm1Station::new(healthy_bank());
        let when = NaiveDate::from_ymd_opt(2150, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(station.set_clock(when).is_err());
    }

    #[test]
    fn test_charger_status_names() {
        assert_eq!(ChargerStatus::from_raw(0), ChargerStatus::Off);
        assert_eq!(ChargerStatus::from_raw(3).to_string(), "Float Charge");
        assert_eq!(ChargerStatus::from_raw(9).to_string(), "Unknown (9)");
    }
}
