use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::collector::{BatchCollector, CollectorError, DrainPolicy, MemorySink, PublishTarget};
use crate::config::DEFAULT_DESTINATION;
use crate::connection::Connection;
use crate::protocols::demand::layout::ENVELOPE_TAG;
use crate::source::{MemorySource, SourceError};
use crate::{ReplayReport, make_stub_report};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// How a captured byte stream is cut into data-available notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationSplit {
    /// One notification per closed envelope, as the device emits them.
    #[default]
    Envelope,
    /// Fixed-size chunks, simulating reads that land mid-message.
    Bytes(NonZeroUsize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOptions {
    pub batch_size: usize,
    pub destination: String,
    pub split: NotificationSplit,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            destination: DEFAULT_DESTINATION.to_string(),
            split: NotificationSplit::Envelope,
        }
    }
}

pub fn replay_file(path: &Path, options: &ReplayOptions) -> Result<ReplayReport, ReplayError> {
    let bytes = std::fs::read(path)?;
    replay_bytes(&path.display().to_string(), &bytes, options)
}

/// Feed `bytes` through a fresh collector and collect what it publishes.
///
/// Notifications left over in an incomplete final batch are counted in
/// `pending_notifications` and never parsed.
pub fn replay_bytes(
    input_path: &str,
    bytes: &[u8],
    options: &ReplayOptions,
) -> Result<ReplayReport, ReplayError> {
    if options.destination.trim().is_empty() {
        return Err(CollectorError::InvalidConfiguration(
            "destination must not be empty".to_string(),
        )
        .into());
    }
    let sink = Arc::new(MemorySink::new());
    let target = PublishTarget::bound(sink.clone(), options.destination.as_str());
    let collector = BatchCollector::new(options.batch_size, DrainPolicy::immediate(), target)?;
    let mut connection = Connection::new(MemorySource::new(), collector);

    let mut report = make_stub_report(input_path, bytes.len() as u64, options.batch_size);
    for chunk in split_notifications(bytes, options.split) {
        connection.source_mut().feed(chunk);
        let outcome = connection.notify();
        report.summary.record(&outcome);
    }
    report.summary.pending_notifications = connection.collector().notifications_received() as u64;
    connection.close()?;

    report.readings = sink.take();
    debug!(summary = ?report.summary, "replay finished");
    Ok(report)
}

/// Cut `bytes` into notification-sized chunks.
///
/// With [`NotificationSplit::Envelope`] each chunk ends after a closing
/// envelope tag plus any whitespace that follows it; trailing bytes with no
/// closing tag form a final chunk.
pub fn split_notifications(bytes: &[u8], split: NotificationSplit) -> Vec<&[u8]> {
    match split {
        NotificationSplit::Bytes(size) => bytes.chunks(size.get()).collect(),
        NotificationSplit::Envelope => split_on_envelopes(bytes),
    }
}

fn split_on_envelopes(bytes: &[u8]) -> Vec<&[u8]> {
    let closing = format!("</{ENVELOPE_TAG}");
    let closing = closing.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut cursor = 0;

    while let Some(found) = find_ignore_case(&bytes[cursor..], closing) {
        let after_name = cursor + found + closing.len();
        let Some(gt) = bytes[after_name..].iter().position(|&b| b == b'>') else {
            break;
        };
        let mut end = after_name + gt + 1;
        while end < bytes.len() && bytes[end].is_ascii_whitespace() {
            end += 1;
        }
        chunks.push(&bytes[start..end]);
        start = end;
        cursor = end;
    }
    if start < bytes.len() {
        chunks.push(&bytes[start..]);
    }
    chunks
}

fn find_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
