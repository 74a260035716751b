//! Telemetry event records shared between the host application and the
//! process that ships them to the telemetry backend.
//!
//! The crate defines the `performance.trace` record, the flat binary parcel
//! used to hand records across a process boundary, and the JSON encoding the
//! backend consumes. Batching, persistence, and upload belong to the
//! pipeline that consumes these records, not to this crate.
//!
//! ```
//! use perftrace_events::{PerformanceTraceEvent, Payload};
//! use serde_json::json;
//!
//! let mut data = Payload::new();
//! data.insert("durationMs".to_string(), json!(42));
//!
//! let event = PerformanceTraceEvent::new("abc-123", data);
//! let bytes = event.encode()?;
//! assert_eq!(PerformanceTraceEvent::decode(&bytes)?, event);
//! # Ok::<(), perftrace_events::EventError>(())
//! ```

pub mod config;
pub mod emitter;
pub mod error;
pub mod event;
pub mod parcel;
pub mod performance;
pub mod timestamp;
pub mod value;
pub mod wire;

use serde::{Deserialize, Serialize};

pub use config::TelemetryConfig;
pub use emitter::{ConfiguredEmitter, EventEmitter, SinkEmitter};
pub use error::{EventError, ParcelError};
pub use event::{Event, TelemetryEvent, new_session_id};
pub use parcel::{ParcelDecode, ParcelEncode, ParcelLimits, ParcelReader, ParcelWriter};
pub use performance::{PERFORMANCE_TRACE, PerformanceTraceEvent};
pub use value::{Payload, ValueKind};

/// Semantic version of the serialized event schema exported by this crate.
pub const EVENT_SCHEMA_VERSION: &str = "0.1.0";

/// Wraps a [`TelemetryEvent`] with schema metadata so downstream consumers can
/// negotiate compatibility before processing an event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionedTelemetryEvent {
    /// Semantic version describing the schema of the nested event payload.
    pub schema_version: String,
    /// Concrete event produced by the host application.
    pub event: TelemetryEvent,
}

impl VersionedTelemetryEvent {
    /// Creates a new [`VersionedTelemetryEvent`] using the current
    /// [`EVENT_SCHEMA_VERSION`].
    pub fn new(event: TelemetryEvent) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION.to_string(),
            event,
        }
    }

    /// Returns the nested [`TelemetryEvent`], consuming the wrapper.
    pub fn into_event(self) -> TelemetryEvent {
        self.event
    }
}

impl From<TelemetryEvent> for VersionedTelemetryEvent {
    fn from(event: TelemetryEvent) -> Self {
        Self::new(event)
    }
}

/// JSON helper utilities for the backend wire encoding.
#[cfg(feature = "serde-json")]
pub mod json {
    use super::{TelemetryEvent, VersionedTelemetryEvent};

    /// Converts an event into a `serde_json::Value`.
    pub fn to_value(event: &TelemetryEvent) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(event)
    }

    /// Serializes an event into a JSON string.
    pub fn to_string(event: &TelemetryEvent) -> serde_json::Result<String> {
        serde_json::to_string(event)
    }

    /// Deserializes an event from a JSON string.
    pub fn from_str(payload: &str) -> serde_json::Result<TelemetryEvent> {
        serde_json::from_str(payload)
    }

    /// Serializes a [`VersionedTelemetryEvent`] wrapper.
    pub fn versioned_to_string(event: &TelemetryEvent) -> serde_json::Result<String> {
        serde_json::to_string(&VersionedTelemetryEvent::new(event.clone()))
    }

    /// Deserializes a [`VersionedTelemetryEvent`] wrapper.
    pub fn versioned_from_str(payload: &str) -> serde_json::Result<VersionedTelemetryEvent> {
        serde_json::from_str(payload)
    }
}

#[cfg(feature = "telemetry-log")]
mod log_support {
    use anyhow::{Result, anyhow};
    use log::Level;

    use super::{EventEmitter, TelemetryConfig, TelemetryEvent, json};

    /// Emits JSON serialized events to the `log` facade at the configured level.
    #[derive(Debug, Clone)]
    pub struct LogEmitter {
        level: Level,
    }

    impl LogEmitter {
        /// Creates a new [`LogEmitter`] that logs at the provided [`Level`].
        pub fn new(level: Level) -> Self {
            Self { level }
        }

        /// Builds an emitter at the level named by [`TelemetryConfig::log_level`].
        pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
            let level = config
                .log_level
                .parse::<Level>()
                .map_err(|err| anyhow!("Invalid log level '{}': {err}", config.log_level))?;
            Ok(Self::new(level))
        }

        pub fn level(&self) -> Level {
            self.level
        }
    }

    impl Default for LogEmitter {
        fn default() -> Self {
            Self { level: Level::Info }
        }
    }

    impl EventEmitter for LogEmitter {
        fn emit(&mut self, event: &TelemetryEvent) {
            if log::log_enabled!(self.level) {
                match json::to_string(event) {
                    Ok(serialized) => log::log!(self.level, "{}", serialized),
                    Err(err) => log::log!(
                        self.level,
                        "failed to serialize perftrace event for logging: {err}"
                    ),
                }
            }
        }
    }
}

#[cfg(feature = "telemetry-log")]
pub use log_support::LogEmitter;

#[cfg(feature = "telemetry-tracing")]
mod tracing_support {
    use anyhow::Result;
    use tracing::Level;

    use super::{EVENT_SCHEMA_VERSION, Event, EventEmitter, TelemetryConfig, TelemetryEvent};

    macro_rules! emit_at {
        ($level:expr, $event:expr) => {
            tracing::event!(
                target: "perftrace_events",
                $level,
                schema_version = EVENT_SCHEMA_VERSION,
                event_type = $event.event_type(),
                session_id = $event.session_id(),
                created = $event.created(),
                event = ?$event,
                "perftrace_event"
            )
        };
    }

    /// Emits structured events as `tracing` events at the specified level.
    #[derive(Debug, Clone)]
    pub struct TracingEmitter {
        level: Level,
    }

    impl TracingEmitter {
        /// Creates a new [`TracingEmitter`] with the provided [`Level`].
        pub fn new(level: Level) -> Self {
            Self { level }
        }

        /// Builds an emitter at the level named by [`TelemetryConfig::log_level`].
        pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
            config.level().map(Self::new)
        }

        pub fn level(&self) -> Level {
            self.level
        }
    }

    impl Default for TracingEmitter {
        fn default() -> Self {
            Self { level: Level::INFO }
        }
    }

    impl EventEmitter for TracingEmitter {
        fn emit(&mut self, event: &TelemetryEvent) {
            match self.level {
                Level::TRACE => emit_at!(Level::TRACE, event),
                Level::DEBUG => emit_at!(Level::DEBUG, event),
                Level::INFO => emit_at!(Level::INFO, event),
                Level::WARN => emit_at!(Level::WARN, event),
                _ => emit_at!(Level::ERROR, event),
            }
        }
    }
}

#[cfg(feature = "telemetry-tracing")]
pub use tracing_support::TracingEmitter;
