//! Delivery of events to whatever the embedding application listens with.

use anyhow::Result;
use perftrace_commons::TelemetrySink;

use crate::config::TelemetryConfig;
use crate::event::{Event, TelemetryEvent};

/// Sink for processing [`TelemetryEvent`] instances.
pub trait EventEmitter {
    /// Invoked for each event produced by the host application.
    fn emit(&mut self, event: &TelemetryEvent);
}

impl<F> EventEmitter for F
where
    F: FnMut(&TelemetryEvent),
{
    fn emit(&mut self, event: &TelemetryEvent) {
        self(event);
    }
}

/// Forwards events to a [`TelemetrySink`].
///
/// Sink failures are logged and dropped; emitting never fails.
#[derive(Debug, Clone, Default)]
pub struct SinkEmitter<S> {
    sink: S,
}

impl<S> SinkEmitter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S> SinkEmitter<S>
where
    S: TelemetrySink<TelemetryEvent>,
{
    pub fn flush(&self) -> Result<()> {
        self.sink.flush()
    }
}

impl<S> EventEmitter for SinkEmitter<S>
where
    S: TelemetrySink<TelemetryEvent>,
{
    fn emit(&mut self, event: &TelemetryEvent) {
        if let Err(err) = self.sink.record(event) {
            tracing::warn!(
                target: "perftrace_events",
                event_type = event.event_type(),
                session_id = event.session_id(),
                error = %err,
                "failed to record telemetry event"
            );
        }
    }
}

/// Drops events that the [`TelemetryConfig`] has switched off.
#[derive(Debug, Clone)]
pub struct ConfiguredEmitter<E> {
    inner: E,
    config: TelemetryConfig,
}

impl<E> ConfiguredEmitter<E> {
    pub fn new(inner: E, config: TelemetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: EventEmitter> EventEmitter for ConfiguredEmitter<E> {
    fn emit(&mut self, event: &TelemetryEvent) {
        if self.config.should_emit(event) {
            self.inner.emit(event);
        } else {
            tracing::trace!(
                target: "perftrace_events",
                event_type = event.event_type(),
                "event type disabled by configuration"
            );
        }
    }
}
