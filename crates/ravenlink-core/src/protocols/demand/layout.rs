use std::fmt;

pub const ENVELOPE_TAG: &str = "InstantaneousDemand";
pub const TIMESTAMP_TAG: &str = "TimeStamp";
pub const DEMAND_TAG: &str = "Demand";
pub const MULTIPLIER_TAG: &str = "Multiplier";
pub const DIVISOR_TAG: &str = "Divisor";

/// Synthetic root wrapped around each batch before parsing.
pub const FRAGMENT_ROOT_TAG: &str = "ravenlink-batch";

/// Characters stripped from every field value (the device's `0x` prefix).
pub const HEX_PREFIX_LEN: usize = 2;
pub const HEX_RADIX: u32 = 16;

/// Seconds between the Unix epoch and 2000-01-01T00:00:00Z (device clock origin).
pub const EPOCH_OFFSET_SECONDS: u64 = 946_684_800;
pub const MICROS_PER_SECOND: u64 = 1_000_000;

/// Published readings carry the magnitude in thousandths of the source unit.
pub const PUBLISH_SCALE: f64 = 1000.0;

/// Field carried inside an `InstantaneousDemand` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Timestamp,
    Demand,
    Multiplier,
    Divisor,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::Timestamp,
        Field::Demand,
        Field::Multiplier,
        Field::Divisor,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            Field::Timestamp => TIMESTAMP_TAG,
            Field::Demand => DEMAND_TAG,
            Field::Multiplier => MULTIPLIER_TAG,
            Field::Divisor => DIVISOR_TAG,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
