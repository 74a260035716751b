//! Reference sink implementations for tests and embedding applications that
//! want to inspect what was recorded.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::telemetry::TelemetrySink;

/// Telemetry sink that keeps every recorded event in memory.
///
/// Clones share the same buffer, so a test can hand one clone to the producer
/// and keep another to inspect the recorded events afterwards.
#[derive(Debug)]
pub struct MemoryTelemetry<Event> {
    events: Arc<Mutex<Vec<Event>>>,
    flushes: Arc<Mutex<usize>>,
}

impl<Event> MemoryTelemetry<Event> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            flushes: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of events recorded so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Number of times [`TelemetrySink::flush`] was invoked.
    pub fn flush_count(&self) -> usize {
        *self.flushes.lock()
    }

    /// Removes and returns every recorded event.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl<Event: Clone> MemoryTelemetry<Event> {
    /// Returns a copy of the recorded events in recording order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl<Event> Clone for MemoryTelemetry<Event> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            flushes: Arc::clone(&self.flushes),
        }
    }
}

impl<Event> Default for MemoryTelemetry<Event> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Event> TelemetrySink<Event> for MemoryTelemetry<Event>
where
    Event: Clone + Send,
{
    fn record(&self, event: &Event) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        *self.flushes.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_recorded_events() {
        let sink = MemoryTelemetry::new();
        let producer = sink.clone();

        producer.record(&"first".to_string()).expect("record");
        producer.record(&"second".to_string()).expect("record");
        producer.flush().expect("flush");

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.flush_count(), 1);
        assert_eq!(sink.events(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn take_drains_the_buffer() {
        let sink = MemoryTelemetry::new();
        sink.record(&1_u32).expect("record");

        assert_eq!(sink.take(), vec![1]);
        assert!(sink.is_empty());
    }
}
