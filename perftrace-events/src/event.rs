//! Capabilities shared by every telemetry event and the envelope that
//! dispatches between event kinds.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EventError, ParcelError};
use crate::parcel::{ParcelDecode, ParcelEncode, ParcelLimits, ParcelReader, ParcelWriter};
use crate::performance::{PERFORMANCE_TRACE, PerformanceTraceEvent};
use crate::wire;

/// Read-only view shared by all telemetry events.
pub trait Event: Send + Sync {
    /// Constant tag identifying the event kind.
    fn event_type(&self) -> &'static str;

    /// Creation timestamp, rendered as `yyyy-MM-ddTHH:mm:ss.SSS±HHMM`.
    fn created(&self) -> &str;

    /// Session the event belongs to.
    fn session_id(&self) -> &str;
}

/// Generates a fresh session identifier.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Every event kind that can travel through a shared transport envelope.
///
/// Parcels and JSON documents both lead with the event type, which selects
/// the variant on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TelemetryEvent {
    PerformanceTrace(PerformanceTraceEvent),
}

impl TelemetryEvent {
    /// Event types this envelope understands.
    pub const KNOWN_TYPES: &'static [&'static str] = &[PERFORMANCE_TRACE];

    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        self.encode_with(ParcelLimits::default())
    }

    pub fn encode_with(&self, limits: ParcelLimits) -> Result<Vec<u8>, EventError> {
        let mut parcel = ParcelWriter::with_limits(limits);
        self.write_to_parcel(&mut parcel)?;
        Ok(parcel.into_bytes())
    }

    /// Decodes a parcel written by [`Self::encode`], choosing the variant
    /// from the leading event type.
    ///
    /// Fails with [`EventError::UnknownEventType`] when that tag names no
    /// known kind, and otherwise with the errors of the variant's own
    /// decoder. All of them report [`EventError::is_malformed`].
    pub fn decode(bytes: &[u8]) -> Result<Self, EventError> {
        Self::decode_with(bytes, ParcelLimits::default())
    }

    pub fn decode_with(bytes: &[u8], limits: ParcelLimits) -> Result<Self, EventError> {
        let mut parcel = ParcelReader::with_limits(bytes, limits);
        let event = Self::read_from_parcel(&mut parcel)?;
        parcel.finish()?;
        Ok(event)
    }

    fn inner(&self) -> &dyn Event {
        match self {
            Self::PerformanceTrace(event) => event,
        }
    }
}

impl Event for TelemetryEvent {
    fn event_type(&self) -> &'static str {
        self.inner().event_type()
    }

    fn created(&self) -> &str {
        self.inner().created()
    }

    fn session_id(&self) -> &str {
        self.inner().session_id()
    }
}

impl From<PerformanceTraceEvent> for TelemetryEvent {
    fn from(event: PerformanceTraceEvent) -> Self {
        Self::PerformanceTrace(event)
    }
}

impl ParcelEncode for TelemetryEvent {
    fn write_to_parcel(&self, parcel: &mut ParcelWriter) -> Result<(), EventError> {
        match self {
            Self::PerformanceTrace(event) => event.write_to_parcel(parcel),
        }
    }
}

impl ParcelDecode for TelemetryEvent {
    fn read_from_parcel(parcel: &mut ParcelReader<'_>) -> Result<Self, EventError> {
        let offset = parcel.position();
        let event_type = parcel
            .peek_string()?
            .ok_or(ParcelError::MissingString { offset })?;
        if event_type == PERFORMANCE_TRACE {
            PerformanceTraceEvent::read_from_parcel(parcel).map(Self::from)
        } else {
            Err(EventError::UnknownEventType(event_type))
        }
    }
}

impl<'de> Deserialize<'de> for TelemetryEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let event_type = value
            .get(wire::EVENT)
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::missing_field(wire::EVENT))?;

        match event_type {
            PERFORMANCE_TRACE => PerformanceTraceEvent::deserialize(value)
                .map(Self::from)
                .map_err(de::Error::custom),
            other => Err(de::Error::unknown_variant(other, Self::KNOWN_TYPES)),
        }
    }
}
