use crate::protocols::common::reader::unity_if_zero;

use super::error::FieldError;
use super::layout::{self, Field};
use super::reader::parse_hex;

/// Decoded instantaneous-demand reading.
///
/// `raw_timestamp` counts seconds since 2000-01-01T00:00:00Z (device clock);
/// `magnitude` is already scaled by the reported multiplier and divisor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    raw_timestamp: u64,
    magnitude: f64,
}

impl Measurement {
    pub fn new(raw_timestamp: u64, magnitude: f64) -> Self {
        Self {
            raw_timestamp,
            magnitude,
        }
    }

    pub fn raw_timestamp(&self) -> u64 {
        self.raw_timestamp
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Absolute Unix timestamp in seconds.
    pub fn unix_timestamp(&self) -> u64 {
        self.raw_timestamp
            .saturating_add(layout::EPOCH_OFFSET_SECONDS)
    }

    /// Absolute Unix timestamp in microseconds.
    pub fn timestamp_micros(&self) -> u64 {
        self.raw_timestamp
            .saturating_mul(layout::MICROS_PER_SECOND)
            .saturating_add(layout::EPOCH_OFFSET_SECONDS * layout::MICROS_PER_SECOND)
    }

    /// Magnitude in thousandths, rounded to the nearest integer.
    pub fn scaled_value(&self) -> i64 {
        (self.magnitude * layout::PUBLISH_SCALE).round() as i64
    }
}

/// Decode the four raw (unprefixed) hex fields of one demand block.
///
/// A zero multiplier or divisor is treated as one; the reading is divided
/// in floating point so the pair acts as a scale factor.
///
/// # Errors
/// Returns `FieldError::MalformedField` for the first field that is empty
/// or not hexadecimal.
pub fn decode_measurement(
    timestamp: &str,
    reading: &str,
    multiplier: &str,
    divisor: &str,
) -> Result<Measurement, FieldError> {
    let raw_timestamp = parse_hex(Field::Timestamp, timestamp)?;
    let reading = parse_hex(Field::Demand, reading)?;
    let multiplier = unity_if_zero(parse_hex(Field::Multiplier, multiplier)?);
    let divisor = unity_if_zero(parse_hex(Field::Divisor, divisor)?);

    let magnitude = reading as f64 / divisor as f64 * multiplier as f64;
    Ok(Measurement::new(raw_timestamp, magnitude))
}
