use std::time::Duration;

use tracing::{debug, warn};

use crate::collector::{
    BatchCollector, Clock, DemandParser, FragmentParser, NotifyOutcome, PublishTarget, ThreadClock,
};
use crate::source::{ByteSource, SourceError};

/// A byte source paired with the collector it feeds.
///
/// The connection owns the source's lifecycle: `close` releases it
/// explicitly, and dropping an unclosed connection closes it as well.
/// Bytes still buffered in an incomplete batch are discarded, not flushed.
pub struct Connection<S, P = DemandParser, C = ThreadClock>
where
    S: ByteSource,
    P: FragmentParser,
    C: Clock,
{
    source: S,
    collector: BatchCollector<P, C>,
    closed: bool,
}

impl<S, P, C> Connection<S, P, C>
where
    S: ByteSource,
    P: FragmentParser,
    C: Clock,
{
    pub fn new(source: S, collector: BatchCollector<P, C>) -> Self {
        Self {
            source,
            collector,
            closed: false,
        }
    }

    /// Deliver one data-available notification to the collector.
    pub fn notify(&mut self) -> NotifyOutcome {
        self.collector.notify_data_available(&mut self.source)
    }

    /// Notify the collector if the source has bytes pending.
    pub fn poll(&mut self) -> Result<Option<NotifyOutcome>, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        if self.source.bytes_available()? == 0 {
            return Ok(None);
        }
        Ok(Some(self.notify()))
    }

    /// Poll until `keep_going` returns false, sleeping `idle` between empty
    /// polls.
    ///
    /// # Errors
    /// Returns the first `SourceError` raised while checking for pending
    /// bytes (e.g. the device was unplugged).
    pub fn run_until<F>(&mut self, idle: Duration, mut keep_going: F) -> Result<(), SourceError>
    where
        F: FnMut(&NotifyOutcome) -> bool,
    {
        loop {
            match self.poll()? {
                Some(outcome) => {
                    if !keep_going(&outcome) {
                        return Ok(());
                    }
                }
                None => self.collector.clock().sleep(idle),
            }
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn collector(&self) -> &BatchCollector<P, C> {
        &self.collector
    }

    pub fn target(&self) -> &PublishTarget {
        self.collector.target()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the source. Runs at most once; dropping afterwards is a no-op.
    pub fn close(mut self) -> Result<(), SourceError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), SourceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let discarded = self.collector.buffered_len();
        if discarded > 0 {
            debug!(discarded, "discarding incomplete batch on close");
        }
        self.source.close()
    }
}

impl<S, P, C> Drop for Connection<S, P, C>
where
    S: ByteSource,
    P: FragmentParser,
    C: Clock,
{
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "closing source on drop failed");
        }
    }
}
