use std::sync::Arc;

use anyhow::Result;

/// Destination for telemetry events handed over by event producers.
///
/// The `Event` type is generic so a sink can be written once and shared by
/// every event schema that flows through it.
pub trait TelemetrySink<Event>: Send + Sync {
    /// Record an event produced by the component.
    fn record(&self, event: &Event) -> Result<()>;

    /// Flush any buffered telemetry data to its destination.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl<Event, S> TelemetrySink<Event> for Arc<S>
where
    S: TelemetrySink<Event> + ?Sized,
{
    fn record(&self, event: &Event) -> Result<()> {
        (**self).record(event)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

impl<Event, S> TelemetrySink<Event> for Box<S>
where
    S: TelemetrySink<Event> + ?Sized,
{
    fn record(&self, event: &Event) -> Result<()> {
        (**self).record(event)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl<Event> TelemetrySink<Event> for NoopTelemetry {
    fn record(&self, _event: &Event) -> Result<()> {
        Ok(())
    }
}
