//! Batching byte collector.
//!
//! One collector is bound to one logical connection. Every data-available
//! notification drains the source into a buffer; after `batch_size`
//! notifications the buffer is handed to the fragment parser as text and
//! the decoded readings are published through the bound [`PublishTarget`].
//!
//! Notifications are handled one at a time (`&mut self`). Nothing below
//! `InvalidConfiguration` escapes to the caller: read failures, markup
//! errors and malformed fields are logged and the collector stays usable.

pub(crate) mod drain;
mod sink;

pub use drain::{Clock, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL, DrainPolicy, DrainStats, ThreadClock};
pub use sink::{MeasurementSink, MemorySink, PublishTarget};

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocols::demand::{FragmentError, FragmentOutcome, parse_fragment};
use crate::source::ByteSource;

use drain::drain_source;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("destination '{existing}' is already bound; cannot bind '{requested}'")]
    AlreadyBound { existing: String, requested: String },
}

/// Turns a completed batch of text into demand measurements.
pub trait FragmentParser {
    fn parse(&mut self, fragment: &str) -> FragmentOutcome;
}

/// Default parser: the streaming instantaneous-demand decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemandParser;

impl FragmentParser for DemandParser {
    fn parse(&mut self, fragment: &str) -> FragmentOutcome {
        parse_fragment(fragment)
    }
}

impl<F> FragmentParser for F
where
    F: FnMut(&str) -> FragmentOutcome,
{
    fn parse(&mut self, fragment: &str) -> FragmentOutcome {
        self(fragment)
    }
}

/// What a single notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The batch is still filling.
    Accumulating { received: usize, buffered: usize },
    /// The batch completed and was handed to the parser.
    Completed(BatchSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub bytes: usize,
    pub measurements: usize,
    pub published: usize,
    pub malformed_blocks: usize,
    pub parse_failed: bool,
    pub read_failures: usize,
}

pub struct BatchCollector<P = DemandParser, C = ThreadClock> {
    buffer: Vec<u8>,
    notifications_received: usize,
    batch_size: usize,
    read_failures: usize,
    policy: DrainPolicy,
    target: PublishTarget,
    parser: P,
    clock: C,
}

impl BatchCollector {
    /// Build a collector with the demand parser and a wall clock.
    ///
    /// # Errors
    /// Returns `CollectorError::InvalidConfiguration` when `batch_size` is
    /// zero or the drain policy allows no polls.
    pub fn new(
        batch_size: usize,
        policy: DrainPolicy,
        target: PublishTarget,
    ) -> Result<Self, CollectorError> {
        Self::with_parts(batch_size, policy, target, DemandParser, ThreadClock)
    }
}

impl<P: FragmentParser, C: Clock> BatchCollector<P, C> {
    pub fn with_parts(
        batch_size: usize,
        policy: DrainPolicy,
        target: PublishTarget,
        parser: P,
        clock: C,
    ) -> Result<Self, CollectorError> {
        if batch_size < 1 {
            return Err(CollectorError::InvalidConfiguration(
                "batch size must be at least 1".to_string(),
            ));
        }
        policy.validate()?;
        Ok(Self {
            buffer: Vec::new(),
            notifications_received: 0,
            batch_size,
            read_failures: 0,
            policy,
            target,
            parser,
            clock,
        })
    }

    /// Handle one data-available signal from `source`.
    pub fn notify_data_available<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> NotifyOutcome {
        self.notifications_received += 1;

        let mark = self.buffer.len();
        if let Err(err) = drain_source(source, &mut self.buffer, &self.policy, &self.clock) {
            warn!(
                error = %err,
                discarded = self.buffer.len() - mark,
                "source read failed; discarding bytes from this notification"
            );
            self.buffer.truncate(mark);
            self.read_failures += 1;
        }

        if self.notifications_received < self.batch_size {
            return NotifyOutcome::Accumulating {
                received: self.notifications_received,
                buffered: self.buffer.len(),
            };
        }
        NotifyOutcome::Completed(self.complete_batch())
    }

    fn complete_batch(&mut self) -> BatchSummary {
        let bytes = std::mem::take(&mut self.buffer);
        self.notifications_received = 0;
        let read_failures = std::mem::take(&mut self.read_failures);

        let outcome = match std::str::from_utf8(&bytes) {
            Ok(text) => self.parser.parse(text),
            Err(err) => {
                warn!(
                    valid_up_to = err.valid_up_to(),
                    bytes = bytes.len(),
                    "batch is not valid UTF-8; dropping it"
                );
                FragmentOutcome::failed(FragmentError::from(err))
            }
        };
        let published = self.target.publish_all(&outcome.measurements);
        if published == 0 && !outcome.measurements.is_empty() {
            debug!(
                measurements = outcome.measurements.len(),
                "no sink or destination bound; batch dropped"
            );
        }

        let summary = BatchSummary {
            bytes: bytes.len(),
            measurements: outcome.measurements.len(),
            published,
            malformed_blocks: outcome.malformed_blocks,
            parse_failed: outcome.failure.is_some(),
            read_failures,
        };
        debug!(?summary, "batch completed");
        summary
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn notifications_received(&self) -> usize {
        self.notifications_received
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn target(&self) -> &PublishTarget {
        &self.target
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }
}
