use std::time::Duration;

use tracing::{debug, warn};

use crate::source::{ByteSource, SourceError};

use super::CollectorError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_POLLS: u32 = 50;

/// Sleep capability used between drain polls.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadClock;

impl Clock for ThreadClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Bounded wait used to absorb a message split across several read-ready
/// events.
///
/// After each drain the collector waits `poll_interval` and drains again
/// while bytes are still pending, at most `max_polls` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

impl DrainPolicy {
    /// Single drain pass without waiting; suited to sources whose bytes are
    /// all present when notified (replays, tests).
    pub const fn immediate() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            max_polls: 1,
        }
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.max_polls == 0 {
            return Err(CollectorError::InvalidConfiguration(
                "drain policy needs at least one poll".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub bytes: usize,
    pub polls: u32,
}

/// Drain `source` into `buffer` until a poll after the wait finds nothing
/// pending, or the policy's poll budget is spent.
pub(crate) fn drain_source<S, C>(
    source: &mut S,
    buffer: &mut Vec<u8>,
    policy: &DrainPolicy,
    clock: &C,
) -> Result<DrainStats, SourceError>
where
    S: ByteSource + ?Sized,
    C: Clock + ?Sized,
{
    let mut stats = DrainStats::default();
    loop {
        stats.bytes += source.read_available(buffer)?;
        clock.sleep(policy.poll_interval);
        stats.polls += 1;
        let pending = source.bytes_available()?;
        if pending == 0 {
            break;
        }
        if stats.polls >= policy.max_polls {
            warn!(
                pending,
                polls = stats.polls,
                "drain poll budget spent with bytes still pending"
            );
            break;
        }
    }
    debug!(bytes = stats.bytes, polls = stats.polls, "source drained");
    Ok(stats)
}
