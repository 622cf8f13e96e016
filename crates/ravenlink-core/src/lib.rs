//! RavenLink core library for RAVEn energy-monitor ingestion.
//!
//! This crate implements the ingestion pipeline used by the CLI: a byte
//! source feeds the batch collector, which hands completed batches to the
//! instantaneous-demand decoder (layout/reader/parser) and publishes the
//! resulting readings to a measurement sink. Decoding is text-oriented and
//! side-effect free; all device I/O is isolated in `source` modules.
//!
//! Invariants:
//! - A batch completes after exactly `batch_size` notifications; buffer and
//!   counter are cleared together.
//! - Readings are published in document order, one per closed block.
//! - A bad message never stops ingestion of subsequent messages.
//!
//! Version française (résumé):
//! Cette crate fournit le cœur d'ingestion : source d'octets -> collecteur
//! par lots -> décodeur `InstantaneousDemand` -> puits de mesures. Les E/S
//! restent dans `source`. Garanties : lots de taille fixe, ordre du document
//! conservé, un message invalide n'interrompt jamais le flux.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//!
//! use ravenlink_core::{BatchCollector, DrainPolicy, MemorySink, MemorySource, PublishTarget};
//!
//! let sink = Arc::new(MemorySink::new());
//! let target = PublishTarget::bound(sink.clone(), "house_power");
//! let mut collector = BatchCollector::new(1, DrainPolicy::immediate(), target)?;
//!
//! let mut source = MemorySource::new();
//! source.feed(
//!     b"<InstantaneousDemand><TimeStamp>0x00000001</TimeStamp><Demand>0x000001</Demand>\
//!       <Multiplier>0x01</Multiplier><Divisor>0x01</Divisor></InstantaneousDemand>",
//! );
//! collector.notify_data_available(&mut source);
//!
//! assert_eq!(sink.readings()[0].value, 1000);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod collector;
pub mod config;
mod connection;
pub mod protocols;
mod replay;
pub mod source;

pub use collector::{
    BatchCollector, BatchSummary, Clock, CollectorError, DemandParser, DrainPolicy,
    FragmentParser, MeasurementSink, MemorySink, NotifyOutcome, PublishTarget, ThreadClock,
};
pub use config::{ConfigError, PipelineConfig};
pub use connection::Connection;
pub use protocols::demand::{
    EPOCH_OFFSET_SECONDS, FieldError, FragmentError, FragmentOutcome, Measurement,
    decode_measurement, parse_fragment,
};
pub use replay::{
    NotificationSplit, ReplayError, ReplayOptions, replay_bytes, replay_file, split_notifications,
};
pub use source::{ByteSource, MemorySource, SourceError};
#[cfg(feature = "serial")]
pub use source::SerialSource;

/// Current replay report schema version.
pub const REPORT_VERSION: u32 = 1;

/// A decoded reading as delivered to a measurement sink.
///
/// # Examples
/// ```
/// use ravenlink_core::{Measurement, PublishedReading};
///
/// let reading = PublishedReading::new("house_power", &Measurement::new(1, 1.0));
/// assert_eq!(reading.value, 1000);
/// assert_eq!(reading.timestamp, 946_684_801);
/// assert_eq!(reading.time.as_deref(), Some("2000-01-01T00:00:01Z"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedReading {
    /// Destination (item) name the reading is routed to.
    pub destination: String,
    /// Magnitude ×1000, rounded to the nearest integer.
    pub value: i64,
    /// Absolute Unix timestamp in seconds.
    pub timestamp: u64,
    /// Absolute Unix timestamp in microseconds.
    pub timestamp_us: u64,
    /// RFC3339 rendering of `timestamp`, when representable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl PublishedReading {
    pub fn new(destination: &str, measurement: &Measurement) -> Self {
        let timestamp = measurement.unix_timestamp();
        Self {
            destination: destination.to_string(),
            value: measurement.scaled_value(),
            timestamp,
            timestamp_us: measurement.timestamp_micros(),
            time: unix_to_rfc3339(timestamp),
        }
    }
}

fn unix_to_rfc3339(seconds: u64) -> Option<String> {
    let seconds = i64::try_from(seconds).ok()?;
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}

/// Outcome of replaying a captured byte stream through the pipeline.
///
/// # Examples
/// ```
/// use ravenlink_core::make_stub_report;
///
/// let report = make_stub_report("capture.xml", 123, 1);
/// assert_eq!(report.report_version, ravenlink_core::REPORT_VERSION);
/// assert!(report.readings.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    /// Tool identification metadata.
    pub tool: ToolInfo,
    /// Input capture metadata.
    pub input: InputInfo,
    /// Notifications per batch used for the replay.
    pub batch_size: usize,
    /// Pipeline counters.
    pub summary: ReplaySummary,
    /// Published readings in publication order.
    pub readings: Vec<PublishedReading>,
}

/// Tool metadata embedded in reports.
///
/// # Examples
/// ```
/// use ravenlink_core::ToolInfo;
///
/// let tool = ToolInfo {
///     name: "ravenlink".to_string(),
///     version: "0.1.0".to_string(),
/// };
/// assert_eq!(tool.name, "ravenlink");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (e.g., "ravenlink").
    pub name: String,
    /// Tool version (semver).
    pub version: String,
}

/// Input capture metadata embedded in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputInfo {
    /// Input path as provided to the replay.
    pub path: String,
    /// Input size in bytes.
    pub bytes: u64,
}

/// Counters accumulated while replaying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Data-available notifications delivered.
    pub notifications: u64,
    /// Completed batches.
    pub batches: u64,
    /// Measurements decoded across all batches.
    pub measurements: u64,
    /// Readings delivered to the sink.
    pub published: u64,
    /// Blocks dropped because a field was not valid hex.
    pub malformed_blocks: u64,
    /// Batches discarded whole because of a markup or encoding error.
    pub parse_failures: u64,
    /// Notifications left in an incomplete batch (discarded, never flushed).
    pub pending_notifications: u64,
}

impl ReplaySummary {
    pub fn record(&mut self, outcome: &NotifyOutcome) {
        self.notifications += 1;
        if let NotifyOutcome::Completed(batch) = outcome {
            self.batches += 1;
            self.measurements += batch.measurements as u64;
            self.published += batch.published as u64;
            self.malformed_blocks += batch.malformed_blocks as u64;
            self.parse_failures += u64::from(batch.parse_failed);
        }
    }
}

/// Build a stub report with base fields filled and empty counters.
pub fn make_stub_report(input_path: &str, input_bytes: u64, batch_size: usize) -> ReplayReport {
    ReplayReport {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "ravenlink".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        input: InputInfo {
            path: input_path.to_string(),
            bytes: input_bytes,
        },
        batch_size,
        summary: ReplaySummary::default(),
        readings: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_omits_time_when_unrepresentable() {
        let reading = PublishedReading::new("p", &Measurement::new(u64::MAX, 0.5));
        assert_eq!(reading.value, 500);
        assert_eq!(reading.timestamp, u64::MAX);
        assert!(reading.time.is_none());

        let value = serde_json::to_value(&reading).expect("reading json");
        assert!(value.get("time").is_none());
        assert_eq!(value["destination"], "p");
    }

    #[test]
    fn summary_counts_completed_batches_only() {
        let mut summary = ReplaySummary::default();
        summary.record(&NotifyOutcome::Accumulating {
            received: 1,
            buffered: 4,
        });
        summary.record(&NotifyOutcome::Completed(BatchSummary {
            bytes: 8,
            measurements: 2,
            published: 2,
            malformed_blocks: 1,
            parse_failed: true,
            read_failures: 0,
        }));
        assert_eq!(summary.notifications, 2);
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.published, 2);
        assert_eq!(summary.malformed_blocks, 1);
        assert_eq!(summary.parse_failures, 1);
    }
}
