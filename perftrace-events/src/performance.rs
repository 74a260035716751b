//! The `performance.trace` event record.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::de::{self, IgnoredAny, MapAccess, Unexpected, Visitor};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EventError;
use crate::event::Event;
use crate::parcel::{ParcelDecode, ParcelEncode, ParcelLimits, ParcelReader, ParcelWriter};
use crate::timestamp;
use crate::value::{self, Payload};
use crate::wire;

/// Event type tag carried by every [`PerformanceTraceEvent`].
pub const PERFORMANCE_TRACE: &str = "performance.trace";

/// One performance measurement reported by the host application.
///
/// The record is immutable: all four fields are fixed at construction and
/// only exposed through accessors. `created` is stamped from the local clock
/// and cannot be supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformanceTraceEvent {
    event: &'static str,
    created: String,
    session_id: String,
    data: Payload,
}

impl PerformanceTraceEvent {
    /// Creates a new event for `session_id`, stamped with the current time.
    ///
    /// Neither argument is validated. Payload values outside the
    /// representable kinds are reported by [`Self::encode`].
    pub fn new(session_id: impl Into<String>, data: Payload) -> Self {
        Self {
            event: PERFORMANCE_TRACE,
            created: timestamp::now(),
            session_id: session_id.into(),
            data,
        }
    }

    /// Rebuilds a record from decoded fields after checking the ones a
    /// conforming encoder always gets right.
    fn restore(
        event: &str,
        created: String,
        session_id: String,
        data: Payload,
    ) -> Result<Self, EventError> {
        if event != PERFORMANCE_TRACE {
            return Err(EventError::MalformedField {
                field: wire::EVENT,
                reason: format!("holds '{event}' instead of '{PERFORMANCE_TRACE}'"),
            });
        }
        if timestamp::parse(&created).is_none() {
            return Err(EventError::MalformedField {
                field: wire::CREATED,
                reason: format!("'{created}' is not a yyyy-MM-ddTHH:mm:ss.SSS±HHMM timestamp"),
            });
        }
        Ok(Self {
            event: PERFORMANCE_TRACE,
            created,
            session_id,
            data,
        })
    }

    pub fn event_type(&self) -> &'static str {
        self.event
    }

    /// Creation time as rendered at construction.
    pub fn created(&self) -> &str {
        &self.created
    }

    /// Creation time as an instant with its original UTC offset.
    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        timestamp::parse(&self.created)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    /// Consumes the record, handing back its payload.
    pub fn into_data(self) -> Payload {
        self.data
    }

    /// Encodes the record into a standalone parcel.
    ///
    /// Fails with [`EventError::UnsupportedValueKind`] for payload numbers
    /// with no parcel representation, [`EventError::NestingTooDeep`] or
    /// [`EventError::ExceedsLimit`] when the record breaks the
    /// [`ParcelLimits`], and [`EventError::Oversized`] when a length does not
    /// fit its slot. A successful `encode_with(limits)` always decodes under
    /// the same `limits`.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        self.encode_with(ParcelLimits::default())
    }

    pub fn encode_with(&self, limits: ParcelLimits) -> Result<Vec<u8>, EventError> {
        let mut parcel = ParcelWriter::with_limits(limits);
        self.write_to_parcel(&mut parcel)?;
        Ok(parcel.into_bytes())
    }

    /// Decodes a parcel produced by [`Self::encode`]. The whole buffer must
    /// be consumed.
    ///
    /// A broken layout (truncation, bad lengths, unknown value tags, trailing
    /// bytes) fails with [`EventError::MalformedRecord`]. An intact layout
    /// whose event tag or `created` stamp no encoder would write fails with
    /// [`EventError::MalformedField`]. Both answer `true` to
    /// [`EventError::is_malformed`].
    pub fn decode(bytes: &[u8]) -> Result<Self, EventError> {
        Self::decode_with(bytes, ParcelLimits::default())
    }

    pub fn decode_with(bytes: &[u8], limits: ParcelLimits) -> Result<Self, EventError> {
        let mut parcel = ParcelReader::with_limits(bytes, limits);
        let event = Self::read_from_parcel(&mut parcel)?;
        parcel.finish()?;
        tracing::debug!(
            target: "perftrace_events",
            bytes = bytes.len(),
            session_id = %event.session_id,
            "decoded performance trace event"
        );
        Ok(event)
    }
}

impl Event for PerformanceTraceEvent {
    fn event_type(&self) -> &'static str {
        self.event
    }

    fn created(&self) -> &str {
        &self.created
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl ParcelEncode for PerformanceTraceEvent {
    fn write_to_parcel(&self, parcel: &mut ParcelWriter) -> Result<(), EventError> {
        parcel.write_string(self.event)?;
        parcel.write_string(&self.created)?;
        parcel.write_string(&self.session_id)?;
        value::write_bundle(parcel, &self.data)
    }
}

impl ParcelDecode for PerformanceTraceEvent {
    fn read_from_parcel(parcel: &mut ParcelReader<'_>) -> Result<Self, EventError> {
        let event = parcel.read_required_string()?;
        let created = parcel.read_required_string()?;
        let session_id = parcel.read_required_string()?;
        let data = value::read_bundle(parcel)?;
        Self::restore(&event, created, session_id, data)
    }
}

impl Serialize for PerformanceTraceEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_struct("PerformanceTraceEvent", wire::FIELDS.len())?;
        record.serialize_field(wire::EVENT, self.event)?;
        record.serialize_field(wire::CREATED, &self.created)?;
        record.serialize_field(wire::SESSION_ID, &self.session_id)?;
        record.serialize_field(wire::DATA, &self.data)?;
        record.end()
    }
}

impl<'de> Deserialize<'de> for PerformanceTraceEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_struct("PerformanceTraceEvent", wire::FIELDS, RecordVisitor)
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = PerformanceTraceEvent;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a performance trace event")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut event: Option<String> = None;
        let mut created: Option<String> = None;
        let mut session_id: Option<String> = None;
        let mut data: Option<Payload> = None;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                wire::EVENT => fill(&mut event, wire::EVENT, &mut map)?,
                wire::CREATED => fill(&mut created, wire::CREATED, &mut map)?,
                wire::SESSION_ID => fill(&mut session_id, wire::SESSION_ID, &mut map)?,
                wire::DATA => fill(&mut data, wire::DATA, &mut map)?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let event = event.ok_or_else(|| de::Error::missing_field(wire::EVENT))?;
        let created = created.ok_or_else(|| de::Error::missing_field(wire::CREATED))?;
        let session_id = session_id.ok_or_else(|| de::Error::missing_field(wire::SESSION_ID))?;
        let data = data.ok_or_else(|| de::Error::missing_field(wire::DATA))?;

        if event != PERFORMANCE_TRACE {
            return Err(de::Error::invalid_value(
                Unexpected::Str(&event),
                &PERFORMANCE_TRACE,
            ));
        }
        if timestamp::parse(&created).is_none() {
            return Err(de::Error::invalid_value(
                Unexpected::Str(&created),
                &"a yyyy-MM-ddTHH:mm:ss.SSS±HHMM timestamp",
            ));
        }

        Ok(PerformanceTraceEvent {
            event: PERFORMANCE_TRACE,
            created,
            session_id,
            data,
        })
    }
}

fn fill<'de, T, A>(slot: &mut Option<T>, field: &'static str, map: &mut A) -> Result<(), A::Error>
where
    T: Deserialize<'de>,
    A: MapAccess<'de>,
{
    if slot.is_some() {
        return Err(de::Error::duplicate_field(field));
    }
    *slot = Some(map.next_value()?);
    Ok(())
}
