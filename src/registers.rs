//! CM1 holding-register layout.
//!
//! The control module groups its sensors into small blocks of holding
//! registers. Each block is read in a single Modbus transaction and decoded
//! word by word against the table below.

use crate::reading::Unit;

/// First register of the system parameter block (product id through charger status).
pub const SYSTEM_ADDRESS: u16 = 100;
/// Word count of the system parameter block.
pub const SYSTEM_WORDS: u16 = 11;

/// First register of the station clock: time as HHMMSS then date as YYMMDD,
/// each a 32-bit word pair.
pub const CLOCK_ADDRESS: u16 = 104;
/// Word count of the clock block.
pub const CLOCK_WORDS: u16 = 4;

/// Status word reported when no sensor is attached to a port.
pub const STATUS_NO_SENSOR: i16 = -1;
/// Lightning status word reported when no detector is attached.
pub const LIGHTNING_NO_SENSOR: u16 = 0x0080;
/// Raw value stored when a calculated reading is unavailable.
pub const CALCULATED_SENTINEL: i16 = -9990;
/// TPH status bit flagging a failed temperature/humidity element.
pub const TPH_FAULT_TH: i16 = 0x01;
/// TPH status bit flagging a failed pressure element.
pub const TPH_FAULT_PRESSURE: i16 = 0x02;

/// A contiguous block of holding registers read in one transaction.
///
/// Groups are polled independently, so a fault on one sensor bus does not
/// take down the rest of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterGroup {
    Power,
    Wind,
    Tph,
    Calculated,
    Rain,
    Analog,
    Lightning,
}

impl RegisterGroup {
    /// Every group, in poll order.
    pub const ALL: [RegisterGroup; 7] = [
        RegisterGroup::Power,
        RegisterGroup::Wind,
        RegisterGroup::Tph,
        RegisterGroup::Calculated,
        RegisterGroup::Rain,
        RegisterGroup::Analog,
        RegisterGroup::Lightning,
    ];

    /// First holding register of the block.
    pub fn address(&self) -> u16 {
        match self {
            RegisterGroup::Power => 108,
            RegisterGroup::Wind => 200,
            RegisterGroup::Tph => 220,
            RegisterGroup::Calculated => 240,
            RegisterGroup::Rain => 242,
            RegisterGroup::Analog => 244,
            RegisterGroup::Lightning => 280,
        }
    }

    /// Number of 16-bit words the block spans.
    pub fn word_count(&self) -> u16 {
        match self {
            RegisterGroup::Power => 3,
            RegisterGroup::Wind => 9,
            RegisterGroup::Tph => 6,
            RegisterGroup::Calculated => 10,
            RegisterGroup::Rain => 2,
            RegisterGroup::Analog => 4,
            RegisterGroup::Lightning => 12,
        }
    }

    /// Lowercase name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            RegisterGroup::Power => "power",
            RegisterGroup::Wind => "wind",
            RegisterGroup::Tph => "tph",
            RegisterGroup::Calculated => "calculated",
            RegisterGroup::Rain => "rain",
            RegisterGroup::Analog => "analog",
            RegisterGroup::Lightning => "lightning",
        }
    }
}

/// Wire representation of a register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordType {
    /// One unsigned word.
    U16,
    /// One word, two's complement signed.
    I16,
    /// Two words, high word first.
    U32,
    /// Two words holding IEEE float bits, low half first, each word
    /// byte-swapped.
    F32,
}

impl WordType {
    /// Words this representation occupies.
    pub fn width(&self) -> usize {
        match self {
            WordType::U16 | WordType::I16 => 1,
            WordType::U32 | WordType::F32 => 2,
        }
    }
}

/// How one sensor is laid out within its register group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterSpec {
    /// Internal sensor name.
    pub name: &'static str,
    /// Group whose read window contains this sensor.
    pub group: RegisterGroup,
    /// Word offset within the group's window.
    pub offset: usize,
    /// Wire representation.
    pub word_type: WordType,
    /// Multiplier applied after integer decode.
    pub scale: f64,
    /// Signed raw value the station stores when the reading is unavailable.
    pub sentinel: Option<i16>,
    /// Unit of the scaled value.
    pub unit: Unit,
}

const fn spec(
    name: &'static str,
    group: RegisterGroup,
    offset: usize,
    word_type: WordType,
    scale: f64,
    unit: Unit,
) -> RegisterSpec {
    RegisterSpec {
        name,
        group,
        offset,
        word_type,
        scale,
        sentinel: None,
        unit,
    }
}

const fn calc(name: &'static str, offset: usize) -> RegisterSpec {
    RegisterSpec {
        name,
        group: RegisterGroup::Calculated,
        offset,
        word_type: WordType::I16,
        scale: 0.1,
        sentinel: Some(CALCULATED_SENTINEL),
        unit: Unit::Celsius,
    }
}

use RegisterGroup as G;
use Unit as U;
use WordType as W;

/// Every pollable sensor, in table order.
///
/// The calculated block's read window spans the rain and analog registers;
/// only four of its ten words are decoded here.
pub static REGISTER_TABLE: &[RegisterSpec] = &[
    // power block
    spec("battery_voltage", G::Power, 0, W::U16, 0.001, U::Volts),
    spec("solar_voltage", G::Power, 1, W::U16, 0.001, U::Volts),
    spec("charger_status", G::Power, 2, W::U16, 1.0, U::None),
    // wind, gated on wind_status
    spec("wind_status", G::Wind, 0, W::I16, 1.0, U::None),
    spec("wind_speed", G::Wind, 1, W::I16, 0.1, U::MetersPerSecond),
    spec("wind_dir", G::Wind, 2, W::I16, 0.1, U::Degrees),
    spec("wind_speed_2m", G::Wind, 3, W::I16, 0.1, U::MetersPerSecond),
    spec("wind_dir_2m", G::Wind, 4, W::I16, 0.1, U::Degrees),
    spec("wind_speed_10m", G::Wind, 5, W::I16, 0.1, U::MetersPerSecond),
    spec("wind_dir_10m", G::Wind, 6, W::I16, 0.1, U::Degrees),
    spec("wind_gust_speed", G::Wind, 7, W::I16, 0.1, U::MetersPerSecond),
    spec("wind_gust_dir", G::Wind, 8, W::I16, 0.1, U::Degrees),
    // temperature/pressure/humidity, gated on tph_status bits
    spec("tph_status", G::Tph, 0, W::I16, 1.0, U::None),
    spec("temperature", G::Tph, 1, W::I16, 0.1, U::Celsius),
    spec("humidity", G::Tph, 2, W::I16, 0.1, U::Percent),
    spec("pressure", G::Tph, 3, W::I16, 0.1, U::HectoPascal),
    spec("pressure_trend", G::Tph, 4, W::I16, 1.0, U::None),
    spec("temperature_p", G::Tph, 5, W::I16, 0.1, U::Celsius),
    // station-calculated values, -9990 when unavailable
    calc("heatindex", 0),
    calc("windchill", 1),
    calc("dewpoint", 8),
    calc("wetbulb", 9),
    // rain counters, raw bucket tips
    spec("rain_day_total", G::Rain, 0, W::U16, 1.0, U::Tips),
    spec("rain_rate", G::Rain, 1, W::U16, 1.0, U::TipsPerHour),
    // analog inputs
    spec("analog_1", G::Analog, 0, W::F32, 1.0, U::None),
    spec("analog_2", G::Analog, 2, W::F32, 1.0, U::None),
    // lightning detector, gated on lightning_status
    spec("lightning_status", G::Lightning, 0, W::U16, 1.0, U::None),
    spec("lightning_strike_count", G::Lightning, 1, W::U16, 1.0, U::Count),
    spec("lightning_noise_count", G::Lightning, 2, W::U16, 1.0, U::Count),
    spec("lightning_disturber_count", G::Lightning, 3, W::U16, 1.0, U::Count),
    // distance 0-40 km, 63 when out of range
    spec("lightning_distance", G::Lightning, 4, W::U16, 1.0, U::Kilometers),
    spec("lightning_energy", G::Lightning, 5, W::U32, 1.0, U::Count),
    spec("lightning_strike_count_10m", G::Lightning, 7, W::U16, 1.0, U::Count),
    spec("lightning_strike_count_30m", G::Lightning, 8, W::U16, 1.0, U::Count),
    spec("lightning_strike_count_60m", G::Lightning, 9, W::U16, 1.0, U::Count),
    spec("lightning_noise_count_60m", G::Lightning, 10, W::U16, 1.0, U::Count),
    spec("lightning_disturber_count_60m", G::Lightning, 11, W::U16, 1.0, U::Count),
];

/// Look up a sensor by its internal name.
pub fn lookup(name: &str) -> Option<&'static RegisterSpec> {
    REGISTER_TABLE.iter().find(|spec| spec.name == name)
}

/// All sensors of one group, in table order.
pub fn group_specs(group: RegisterGroup) -> impl Iterator<Item = &'static RegisterSpec> {
    REGISTER_TABLE.iter().filter(move |spec| spec.group == group)
}

/// Decode one sensor from its group's read window.
///
/// Returns `None` when the raw value matches the spec's sentinel.
pub fn decode_value(spec: &RegisterSpec, words: &[u16]) -> Option<f64> {
    let raw = match spec.word_type {
        WordType::U16 => f64::from(words[spec.offset]),
        WordType::I16 => {
            let signed = words[spec.offset] as i16;
            if spec.sentinel == Some(signed) {
                return None;
            }
            f64::from(signed)
        }
        WordType::U32 => f64::from(word_pair_u32(words[spec.offset], words[spec.offset + 1])),
        WordType::F32 => f64::from(word_pair_f32(words[spec.offset], words[spec.offset + 1])),
    };
    Some(raw * spec.scale)
}

/// Join two words into a 32-bit value, high word first.
pub fn word_pair_u32(hi: u16, lo: u16) -> u32 {
    (u32::from(hi) << 16) | u32::from(lo)
}

/// Split a 32-bit value into its high and low words.
pub fn split_u32(value: u32) -> (u16, u16) {
    ((value >> 16) as u16, (value & 0xFFFF) as u16)
}

/// Reassemble a float from the analog block. The first word carries the low
/// half of the IEEE bits and each word's bytes arrive swapped.
pub fn word_pair_f32(a: u16, b: u16) -> f32 {
    let bits = u32::from(a.swap_bytes()) | (u32::from(b.swap_bytes()) << 16);
    f32::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_lookup_known_sensor() {
        let spec = lookup("wind_speed").unwrap();
        assert_eq!(spec.group, RegisterGroup::Wind);
        assert_eq!(spec.offset, 1);
        assert_eq!(spec.unit, Unit::MetersPerSecond);
    }

    #[test]
    fn test_lookup_unknown_sensor() {
        assert!(lookup("bogus").is_none());
    }

    #[test]
    fn test_names_unique() {
        let names: std::collections::HashSet<_> =
            REGISTER_TABLE.iter().map(|spec| spec.name).collect();
        assert_eq!(names.len(), REGISTER_TABLE.len());
    }

    #[test]
    fn test_offsets_inside_group_window() {
        for spec in REGISTER_TABLE {
            let end = spec.offset + spec.word_type.width();
            assert!(
                end <= spec.group.word_count() as usize,
                "{} overruns its window",
                spec.name
            );
        }
    }

    #[test]
    fn test_group_windows() {
        let expected = [
            (RegisterGroup::Power, 108, 3),
            (RegisterGroup::Wind, 200, 9),
            (RegisterGroup::Tph, 220, 6),
            (RegisterGroup::Calculated, 240, 10),
            (RegisterGroup::Rain, 242, 2),
            (RegisterGroup::Analog, 244, 4),
            (RegisterGroup::Lightning, 280, 12),
        ];
        for (group, address, count) in expected {
            assert_eq!(group.address(), address);
            assert_eq!(group.word_count(), count);
        }
    }

    #[test]
    fn test_decode_scaled_i16() {
        let spec = lookup("temperature").unwrap();
        let words = [0, 215, 580, 10_132, 1, 220];
        assert_close(decode_value(spec, &words).unwrap(), 21.5);
    }

    #[test]
    fn test_decode_negative_i16() {
        let spec = lookup("temperature").unwrap();
        let words = [0, 0xFF38, 580, 10_132, 1, 220];
        assert_close(decode_value(spec, &words).unwrap(), -20.0);
    }

    #[test]
    fn test_decode_sentinel_yields_none() {
        let spec = lookup("windchill").unwrap();
        // -9990 as an unsigned word
        let mut words = [0u16; 10];
        words[1] = 0xD8FA;
        assert_eq!(decode_value(spec, &words), None);

        // a legitimate zero decodes as a value, not as missing
        words[1] = 0;
        assert_eq!(decode_value(spec, &words), Some(0.0));
    }

    #[test]
    fn test_decode_u32_pair() {
        let spec = lookup("lightning_energy").unwrap();
        let mut words = [0u16; 12];
        words[5] = 0x0001;
        words[6] = 0x0002;
        assert_close(decode_value(spec, &words).unwrap(), 65_538.0);
    }

    #[test]
    fn test_float_word_layout() {
        assert_close(f64::from(word_pair_f32(0x0000, 0x803F)), 1.0);
        assert!((f64::from(word_pair_f32(0x79E9, 0xF642)) - 123.456).abs() < 0.001);
    }

    #[test]
    fn test_split_join_round_trip() {
        let (hi, lo) = split_u32(160_908);
        assert_eq!(word_pair_u32(hi, lo), 160_908);
    }
}
