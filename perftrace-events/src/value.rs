//! Self-describing payload encoding.
//!
//! Payloads are free-form JSON maps. Inside a parcel they travel as a bundle:
//! an `i32` body length, the `BNDL` magic, an entry count, and then
//! `key, tag, value` triples where the tag identifies one of the
//! [`ValueKind`]s below. Tag numbers match the platform key-value container.

use std::fmt;

use serde_json::{Map, Number, Value};

use crate::error::{EventError, ParcelError};
use crate::parcel::{ParcelReader, ParcelWriter};

/// Free-form payload attached to an event.
pub type Payload = Map<String, Value>;

/// "BNDL" read as a little-endian `i32`.
pub const BUNDLE_MAGIC: i32 = 0x4C44_4E42;

/// The closed set of value kinds a payload may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    String,
    Map,
    /// Integer within the signed 64-bit range.
    Long,
    /// Any number that is not an integer.
    Double,
    Boolean,
    List,
}

impl ValueKind {
    pub const ALL: [ValueKind; 7] = [
        ValueKind::Null,
        ValueKind::String,
        ValueKind::Map,
        ValueKind::Long,
        ValueKind::Double,
        ValueKind::Boolean,
        ValueKind::List,
    ];

    /// Classifies a JSON value, returning `None` when it falls outside the
    /// representable set (unsigned integers above `i64::MAX`).
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(_) => Some(Self::Boolean),
            Value::String(_) => Some(Self::String),
            Value::Array(_) => Some(Self::List),
            Value::Object(_) => Some(Self::Map),
            Value::Number(number) if number.is_i64() => Some(Self::Long),
            Value::Number(number) if number.is_f64() => Some(Self::Double),
            Value::Number(_) => None,
        }
    }

    /// Parcel tag written ahead of a value of this kind.
    pub const fn tag(self) -> i32 {
        match self {
            Self::Null => -1,
            Self::String => 0,
            Self::Map => 2,
            Self::Long => 6,
            Self::Double => 8,
            Self::Boolean => 9,
            Self::List => 11,
        }
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String => "string",
            Self::Map => "map",
            Self::Long => "long",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::List => "list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes `payload` as a length-prefixed bundle.
pub fn write_bundle(parcel: &mut ParcelWriter, payload: &Payload) -> Result<(), EventError> {
    let length_at = parcel.reserve_i32();
    let start = parcel.len();
    parcel.write_i32(BUNDLE_MAGIC);
    write_entries(parcel, payload, "", 0)?;

    let body = parcel.len() - start;
    let body = i32::try_from(body).map_err(|_| EventError::Oversized {
        what: "bundle",
        length: body,
    })?;
    parcel.patch_i32(length_at, body);
    Ok(())
}

fn write_entries(
    parcel: &mut ParcelWriter,
    entries: &Payload,
    path: &str,
    depth: usize,
) -> Result<(), EventError> {
    parcel.write_count("map entry count", entries.len())?;
    for (key, value) in entries {
        parcel.write_string(key)?;
        let child = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        write_value(parcel, value, &child, depth)?;
    }
    Ok(())
}

fn write_value(
    parcel: &mut ParcelWriter,
    value: &Value,
    path: &str,
    depth: usize,
) -> Result<(), EventError> {
    let kind = ValueKind::of(value).ok_or_else(|| EventError::UnsupportedValueKind {
        path: path.to_string(),
        kind: format!("integer {value} is outside the signed 64-bit range"),
    })?;
    parcel.write_i32(kind.tag());

    match value {
        Value::Null => {}
        Value::Bool(flag) => parcel.write_bool(*flag),
        Value::String(text) => parcel.write_string(text)?,
        Value::Number(number) => write_number(parcel, number, kind, path)?,
        Value::Array(items) => {
            let depth = enter(parcel, path, depth)?;
            parcel.write_count("list length", items.len())?;
            for (index, item) in items.iter().enumerate() {
                write_value(parcel, item, &format!("{path}[{index}]"), depth)?;
            }
        }
        Value::Object(entries) => {
            let depth = enter(parcel, path, depth)?;
            write_entries(parcel, entries, path, depth)?;
        }
    }
    Ok(())
}

fn write_number(
    parcel: &mut ParcelWriter,
    number: &Number,
    kind: ValueKind,
    path: &str,
) -> Result<(), EventError> {
    let unsupported = || EventError::UnsupportedValueKind {
        path: path.to_string(),
        kind: format!("number {number} has no parcel representation"),
    };
    match kind {
        ValueKind::Long => parcel.write_i64(number.as_i64().ok_or_else(unsupported)?),
        _ => parcel.write_f64(number.as_f64().ok_or_else(unsupported)?),
    }
    Ok(())
}

fn enter(parcel: &ParcelWriter, path: &str, depth: usize) -> Result<usize, EventError> {
    let limit = parcel.limits().max_depth;
    let depth = depth + 1;
    if depth > limit {
        return Err(EventError::NestingTooDeep {
            path: path.to_string(),
            limit,
        });
    }
    Ok(depth)
}

/// Reads a bundle written by [`write_bundle`].
pub fn read_bundle(parcel: &mut ParcelReader<'_>) -> Result<Payload, ParcelError> {
    let offset = parcel.position();
    let declared = parcel.read_i32()?;
    let declared = usize::try_from(declared).map_err(|_| ParcelError::InvalidLength {
        offset,
        length: i64::from(declared),
    })?;

    let start = parcel.position();
    let found = parcel.read_i32()?;
    if found != BUNDLE_MAGIC {
        return Err(ParcelError::BadBundleMagic {
            offset: start,
            found,
        });
    }

    let payload = read_entries(parcel, 0)?;
    let consumed = parcel.position() - start;
    if consumed != declared {
        return Err(ParcelError::InvalidLength {
            offset,
            length: i64::try_from(declared).unwrap_or(i64::MAX),
        });
    }
    Ok(payload)
}

fn read_entries(parcel: &mut ParcelReader<'_>, depth: usize) -> Result<Payload, ParcelError> {
    let max = parcel.limits().max_entries;
    let count = parcel.read_len("map entry count", max)?;
    let mut entries = Map::new();
    for _ in 0..count {
        let offset = parcel.position();
        let key = parcel.read_required_string()?;
        if entries.contains_key(&key) {
            return Err(ParcelError::DuplicateKey { offset, key });
        }
        let value = read_value(parcel, depth)?;
        entries.insert(key, value);
    }
    Ok(entries)
}

fn read_value(parcel: &mut ParcelReader<'_>, depth: usize) -> Result<Value, ParcelError> {
    let offset = parcel.position();
    let tag = parcel.read_i32()?;
    let kind = ValueKind::from_tag(tag).ok_or(ParcelError::UnknownValueTag { offset, tag })?;

    let value = match kind {
        ValueKind::Null => Value::Null,
        ValueKind::Boolean => Value::Bool(parcel.read_bool()?),
        ValueKind::String => Value::String(parcel.read_required_string()?),
        ValueKind::Long => Value::from(parcel.read_i64()?),
        ValueKind::Double => {
            let at = parcel.position();
            let raw = parcel.read_f64()?;
            Number::from_f64(raw)
                .map(Value::Number)
                .ok_or(ParcelError::NonFiniteDouble { offset: at })?
        }
        ValueKind::List => {
            let depth = nest(parcel, offset, depth)?;
            let max = parcel.limits().max_entries;
            let count = parcel.read_len("list length", max)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_value(parcel, depth)?);
            }
            Value::Array(items)
        }
        ValueKind::Map => {
            let depth = nest(parcel, offset, depth)?;
            Value::Object(read_entries(parcel, depth)?)
        }
    };
    Ok(value)
}

fn nest(parcel: &ParcelReader<'_>, offset: usize, depth: usize) -> Result<usize, ParcelError> {
    let max = parcel.limits().max_depth;
    let depth = depth + 1;
    if depth > max {
        return Err(ParcelError::LimitExceeded {
            offset,
            limit: "nesting depth",
            max,
            found: depth,
        });
    }
    Ok(depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parcel::ParcelLimits;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn round_trip(map: &Payload) -> Payload {
        let mut parcel = ParcelWriter::new();
        write_bundle(&mut parcel, map).expect("write bundle");
        let mut reader = ParcelReader::new(parcel.as_bytes());
        let decoded = read_bundle(&mut reader).expect("read bundle");
        reader.finish().expect("fully consumed");
        decoded
    }

    #[test]
    fn bundle_layout_is_stable() {
        let mut parcel = ParcelWriter::new();
        write_bundle(&mut parcel, &payload(json!({ "ok": true }))).expect("write");

        #[rustfmt::skip]
        let expected: &[u8] = &[
            24, 0, 0, 0,            // body length
            0x42, 0x4E, 0x44, 0x4C, // "BNDL"
            1, 0, 0, 0,             // entry count
            2, 0, 0, 0, b'o', b'k', 0, 0,
            9, 0, 0, 0,             // boolean tag
            1, 0, 0, 0,
        ];
        assert_eq!(parcel.as_bytes(), expected);
    }

    #[test]
    fn every_kind_survives_the_trip() {
        let map = payload(json!({
            "nothing": null,
            "name": "frame-render",
            "durationMs": 42,
            "negative": -9_000_000_000_i64,
            "ratio": 0.25,
            "whole": 2.0,
            "ok": false,
            "samples": [1, "two", 3.5, null, [true]],
            "attributes": { "gpu": { "vendor": "acme" }, "cores": 8 },
            "": "empty key",
        }));

        assert_eq!(round_trip(&map), map);
    }

    #[test]
    fn integral_doubles_stay_doubles() {
        let map = payload(json!({ "whole": 2.0 }));
        let decoded = round_trip(&map);
        assert_eq!(decoded.get("whole").and_then(Value::as_f64), Some(2.0));
        assert!(decoded.get("whole").is_some_and(Value::is_f64));
    }

    #[test]
    fn large_unsigned_integers_are_unsupported() {
        let map = payload(json!({ "metrics": { "bytes": u64::MAX } }));
        let mut parcel = ParcelWriter::new();

        let err = write_bundle(&mut parcel, &map).expect_err("u64::MAX has no parcel form");
        assert!(matches!(
            err,
            EventError::UnsupportedValueKind { ref path, .. } if path == "metrics.bytes"
        ));
    }

    #[test]
    fn encoding_respects_depth_limit() {
        let map = payload(json!({ "a": { "b": { "c": [1] } } }));
        let limits = ParcelLimits {
            max_depth: 2,
            ..ParcelLimits::default()
        };
        let mut parcel = ParcelWriter::with_limits(limits);

        let err = write_bundle(&mut parcel, &map).expect_err("too deep");
        assert_eq!(
            err,
            EventError::NestingTooDeep {
                path: "a.b.c".to_string(),
                limit: 2,
            }
        );
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let mut parcel = ParcelWriter::new();
        let length_at = parcel.reserve_i32();
        parcel.write_i32(BUNDLE_MAGIC);
        parcel.write_i32(1);
        parcel.write_string("k").expect("key");
        parcel.write_i32(4); // parcelable tag, not part of the payload kinds
        parcel.patch_i32(length_at, 20);

        let mut reader = ParcelReader::new(parcel.as_bytes());
        assert_eq!(
            read_bundle(&mut reader),
            Err(ParcelError::UnknownValueTag { offset: 20, tag: 4 })
        );
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut parcel = ParcelWriter::new();
        parcel.write_i32(8);
        parcel.write_i32(0x1234_5678);
        parcel.write_i32(0);

        let mut reader = ParcelReader::new(parcel.as_bytes());
        assert_eq!(
            read_bundle(&mut reader),
            Err(ParcelError::BadBundleMagic {
                offset: 4,
                found: 0x1234_5678,
            })
        );
    }

    #[test]
    fn declared_length_must_match_body() {
        let mut parcel = ParcelWriter::new();
        write_bundle(&mut parcel, &payload(json!({ "k": 1 }))).expect("write");
        let mut bytes = parcel.into_bytes();
        if let Some(first) = bytes.first_mut() {
            *first += 4;
        }

        let mut reader = ParcelReader::new(&bytes);
        assert!(matches!(
            read_bundle(&mut reader),
            Err(ParcelError::InvalidLength { offset: 0, .. })
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut parcel = ParcelWriter::new();
        let length_at = parcel.reserve_i32();
        parcel.write_i32(BUNDLE_MAGIC);
        parcel.write_i32(2);
        for _ in 0..2 {
            parcel.write_string("k").expect("key");
            parcel.write_i32(ValueKind::Null.tag());
        }
        let body = i32::try_from(parcel.len() - 4).expect("small");
        parcel.patch_i32(length_at, body);

        let mut reader = ParcelReader::new(parcel.as_bytes());
        assert!(matches!(
            read_bundle(&mut reader),
            Err(ParcelError::DuplicateKey { ref key, .. }) if key == "k"
        ));
    }

    #[test]
    fn decoding_respects_depth_limit() {
        let map = payload(json!({ "a": [[[]]] }));
        let mut parcel = ParcelWriter::new();
        write_bundle(&mut parcel, &map).expect("write");

        let limits = ParcelLimits {
            max_depth: 2,
            ..ParcelLimits::default()
        };
        let mut reader = ParcelReader::with_limits(parcel.as_bytes(), limits);
        assert!(matches!(
            read_bundle(&mut reader),
            Err(ParcelError::LimitExceeded {
                limit: "nesting depth",
                ..
            })
        ));
    }

    #[test]
    fn encoding_respects_entry_limit() {
        let limits = ParcelLimits {
            max_entries: 3,
            ..ParcelLimits::default()
        };
        let encode = |map: &Payload| {
            let mut parcel = ParcelWriter::with_limits(limits);
            write_bundle(&mut parcel, map).map(|()| parcel.into_bytes())
        };

        let at_limit = payload(json!({ "a": 1, "b": 2, "c": [1, 2, 3] }));
        let bytes = encode(&at_limit).expect("at the limit");
        let mut reader = ParcelReader::with_limits(&bytes, limits);
        assert_eq!(read_bundle(&mut reader).expect("read"), at_limit);

        let wide_map = payload(json!({ "a": 1, "b": 2, "c": 3, "d": 4 }));
        assert_eq!(
            encode(&wide_map),
            Err(EventError::ExceedsLimit {
                what: "map entry count",
                max: 3,
                found: 4,
            })
        );

        let long_list = payload(json!({ "a": [1, 2, 3, 4] }));
        assert_eq!(
            encode(&long_list),
            Err(EventError::ExceedsLimit {
                what: "list length",
                max: 3,
                found: 4,
            })
        );
    }

    #[test]
    fn tags_map_back_to_kinds() {
        for kind in ValueKind::ALL {
            assert_eq!(ValueKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ValueKind::from_tag(1), None);
    }
}
