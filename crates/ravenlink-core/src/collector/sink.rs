use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::PublishedReading;
use crate::protocols::demand::Measurement;

use super::CollectorError;

/// Downstream consumer of decoded readings (e.g. a home-automation item).
///
/// `publish` runs while the owning [`PublishTarget`] is read-locked, so
/// implementations must not attach or detach sinks on that target.
pub trait MeasurementSink: Send + Sync {
    fn publish(&self, destination: &str, reading: &PublishedReading);
}

#[derive(Default)]
struct Binding {
    sink: Option<Arc<dyn MeasurementSink>>,
    destination: Option<String>,
}

/// Shared, runtime-rebindable publication target.
///
/// Clones share the same binding. A batch is published under one read
/// guard: it reaches a single sink or none, and once `detach_sink`
/// returns the detached sink receives nothing further.
#[derive(Clone, Default)]
pub struct PublishTarget {
    inner: Arc<RwLock<Binding>>,
}

impl PublishTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bound(sink: Arc<dyn MeasurementSink>, destination: impl Into<String>) -> Self {
        let target = Self::new();
        {
            let mut binding = target.inner.write();
            binding.sink = Some(sink);
            binding.destination = Some(destination.into());
        }
        target
    }

    pub fn attach_sink(&self, sink: Arc<dyn MeasurementSink>) {
        self.inner.write().sink = Some(sink);
        info!("measurement sink attached");
    }

    pub fn detach_sink(&self) -> Option<Arc<dyn MeasurementSink>> {
        let previous = self.inner.write().sink.take();
        if previous.is_some() {
            info!("measurement sink detached");
        }
        previous
    }

    /// Bind the destination readings are published under.
    ///
    /// # Errors
    /// Returns `CollectorError::AlreadyBound` when a different destination
    /// is bound; only one item may be fed per connection.
    pub fn bind_destination(&self, destination: impl Into<String>) -> Result<(), CollectorError> {
        let destination = destination.into();
        let mut binding = self.inner.write();
        if let Some(existing) = binding.destination.as_deref() {
            if existing != destination {
                return Err(CollectorError::AlreadyBound {
                    existing: existing.to_string(),
                    requested: destination,
                });
            }
        }
        info!(destination = %destination, "destination bound");
        binding.destination = Some(destination);
        Ok(())
    }

    pub fn clear_destination(&self) -> Option<String> {
        self.inner.write().destination.take()
    }

    pub fn destination(&self) -> Option<String> {
        self.inner.read().destination.clone()
    }

    pub fn has_sink(&self) -> bool {
        self.inner.read().sink.is_some()
    }

    /// Publish a batch; returns how many readings were delivered.
    pub(crate) fn publish_all(&self, measurements: &[Measurement]) -> usize {
        let binding = self.inner.read();
        let (Some(sink), Some(destination)) = (binding.sink.as_ref(), binding.destination.as_deref())
        else {
            return 0;
        };
        for measurement in measurements {
            sink.publish(destination, &PublishedReading::new(destination, measurement));
        }
        measurements.len()
    }
}

/// Sink that keeps every reading in memory, in publication order.
#[derive(Debug, Default)]
pub struct MemorySink {
    readings: Mutex<Vec<PublishedReading>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readings(&self) -> Vec<PublishedReading> {
        self.readings.lock().clone()
    }

    pub fn take(&self) -> Vec<PublishedReading> {
        std::mem::take(&mut *self.readings.lock())
    }

    pub fn len(&self) -> usize {
        self.readings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.lock().is_empty()
    }
}

impl MeasurementSink for MemorySink {
    fn publish(&self, _destination: &str, reading: &PublishedReading) {
        self.readings.lock().push(reading.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{MemorySink, PublishTarget};
    use crate::collector::CollectorError;
    use crate::protocols::demand::Measurement;

    #[test]
    fn publishes_only_when_fully_bound() {
        let sink = Arc::new(MemorySink::new());
        let target = PublishTarget::new();
        let batch = [Measurement::new(1, 1.0)];

        assert_eq!(target.publish_all(&batch), 0);
        target.attach_sink(sink.clone());
        assert_eq!(target.publish_all(&batch), 0);
        target.bind_destination("house_power").unwrap();
        assert_eq!(target.publish_all(&batch), 1);

        let readings = sink.readings();
        assert_eq!(readings[0].destination, "house_power");
        assert_eq!(readings[0].value, 1000);
        assert_eq!(readings[0].timestamp, 946_684_801);
    }

    #[test]
    fn detached_sink_receives_nothing() {
        let sink = Arc::new(MemorySink::new());
        let target = PublishTarget::bound(sink.clone(), "house_power");
        assert!(target.detach_sink().is_some());
        assert!(!target.has_sink());
        assert_eq!(target.publish_all(&[Measurement::new(0, 2.0)]), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn second_destination_is_rejected() {
        let target = PublishTarget::new();
        target.bind_destination("a").unwrap();
        target.bind_destination("a").unwrap();
        let err = target.bind_destination("b").unwrap_err();
        assert!(matches!(err, CollectorError::AlreadyBound { .. }));
        assert_eq!(target.clear_destination().as_deref(), Some("a"));
        target.bind_destination("b").unwrap();
        assert_eq!(target.destination().as_deref(), Some("b"));
    }
}
