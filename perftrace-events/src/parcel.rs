//! Flat binary parcel used to move events across a process boundary.
//!
//! The layout mirrors the platform parcel format: every primitive slot is
//! little-endian and 4-byte aligned, `i32` slots take 4 bytes, `i64` and
//! `f64` slots take 8 bytes, and strings are written as an `i32` byte length
//! (`-1` for an absent string) followed by UTF-8 bytes zero-padded to the
//! next 4-byte boundary.

use serde::{Deserialize, Serialize};

use crate::error::{EventError, ParcelError};

const ABSENT_LENGTH: i32 = -1;

/// Bounds applied while reading and writing parcels so that a corrupt length
/// prefix can never trigger an unbounded allocation or recursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelLimits {
    /// Longest string accepted, in bytes.
    #[serde(default = "default_max_string_bytes")]
    pub max_string_bytes: usize,

    /// Largest entry count accepted for a single map or list.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Deepest nesting of maps and lists inside the payload.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ParcelLimits {
    fn default() -> Self {
        Self {
            max_string_bytes: default_max_string_bytes(),
            max_entries: default_max_entries(),
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_string_bytes() -> usize {
    1 << 20
}

fn default_max_entries() -> usize {
    4096
}

fn default_max_depth() -> usize {
    32
}

/// Types that can flatten themselves into a parcel.
pub trait ParcelEncode {
    fn write_to_parcel(&self, parcel: &mut ParcelWriter) -> Result<(), EventError>;
}

/// Types that can be rebuilt from a parcel written by [`ParcelEncode`].
pub trait ParcelDecode: Sized {
    fn read_from_parcel(parcel: &mut ParcelReader<'_>) -> Result<Self, EventError>;
}

/// Append-only parcel buffer.
#[derive(Debug, Clone, Default)]
pub struct ParcelWriter {
    buf: Vec<u8>,
    limits: ParcelLimits,
}

impl ParcelWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ParcelLimits) -> Self {
        Self {
            buf: Vec::new(),
            limits,
        }
    }

    pub fn limits(&self) -> &ParcelLimits {
        &self.limits
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_i32(i32::from(value));
    }

    /// Writes a length or element count into an `i32` slot.
    pub fn write_len(&mut self, what: &'static str, length: usize) -> Result<(), EventError> {
        let slot = i32::try_from(length).map_err(|_| EventError::Oversized { what, length })?;
        self.write_i32(slot);
        Ok(())
    }

    /// Writes a map or list element count, enforcing `max_entries` the same
    /// way [`ParcelReader::read_len`] does on the way back in.
    pub fn write_count(&mut self, what: &'static str, count: usize) -> Result<(), EventError> {
        let max = self.limits.max_entries;
        if count > max {
            return Err(EventError::ExceedsLimit {
                what,
                max,
                found: count,
            });
        }
        self.write_len(what, count)
    }

    /// Writes a present string, rejecting anything longer than
    /// `max_string_bytes` so the reader under the same limits accepts it.
    pub fn write_string(&mut self, value: &str) -> Result<(), EventError> {
        let max = self.limits.max_string_bytes;
        if value.len() > max {
            return Err(EventError::ExceedsLimit {
                what: "string length",
                max,
                found: value.len(),
            });
        }
        self.write_len("string", value.len())?;
        self.buf.extend_from_slice(value.as_bytes());
        let padding = padded_len(value.len()) - value.len();
        self.buf.resize(self.buf.len() + padding, 0);
        Ok(())
    }

    pub fn write_absent_string(&mut self) {
        self.write_i32(ABSENT_LENGTH);
    }

    /// Reserves an `i32` slot to be filled in later by [`Self::patch_i32`].
    pub fn reserve_i32(&mut self) -> usize {
        let at = self.buf.len();
        self.write_i32(0);
        at
    }

    /// Overwrites a slot previously handed out by [`Self::reserve_i32`].
    pub fn patch_i32(&mut self, at: usize, value: i32) {
        let end = at.saturating_add(4);
        if let Some(slot) = self.buf.get_mut(at..end) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }
}

/// Cursor over a parcel buffer.
///
/// The reader is cheap to copy, which is how callers peek at upcoming fields
/// without consuming them.
#[derive(Debug, Clone, Copy)]
pub struct ParcelReader<'a> {
    data: &'a [u8],
    pos: usize,
    limits: ParcelLimits,
}

impl<'a> ParcelReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_limits(data, ParcelLimits::default())
    }

    pub fn with_limits(data: &'a [u8], limits: ParcelLimits) -> Self {
        Self {
            data,
            pos: 0,
            limits,
        }
    }

    pub fn limits(&self) -> &ParcelLimits {
        &self.limits
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Fails unless every byte of the buffer has been consumed.
    pub fn finish(&self) -> Result<(), ParcelError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(ParcelError::TrailingBytes {
                offset: self.pos,
                remaining,
            }),
        }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], ParcelError> {
        let truncated = ParcelError::Truncated {
            offset: self.pos,
            needed,
            remaining: self.remaining(),
        };
        let end = self.pos.checked_add(needed).ok_or_else(|| truncated.clone())?;
        let bytes = self.data.get(self.pos..end).ok_or(truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ParcelError> {
        let offset = self.pos;
        let bytes = self.take(N)?;
        <[u8; N]>::try_from(bytes).map_err(|_| ParcelError::Truncated {
            offset,
            needed: N,
            remaining: bytes.len(),
        })
    }

    pub fn read_i32(&mut self) -> Result<i32, ParcelError> {
        self.take_array().map(i32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64, ParcelError> {
        self.take_array().map(i64::from_le_bytes)
    }

    pub fn read_f64(&mut self) -> Result<f64, ParcelError> {
        self.take_array().map(f64::from_le_bytes)
    }

    pub fn read_bool(&mut self) -> Result<bool, ParcelError> {
        let offset = self.pos;
        match self.read_i32()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(ParcelError::InvalidBoolean { offset, value }),
        }
    }

    /// Reads a length or element count slot, enforcing `max`.
    pub fn read_len(&mut self, limit: &'static str, max: usize) -> Result<usize, ParcelError> {
        let offset = self.pos;
        let raw = self.read_i32()?;
        let length = usize::try_from(raw).map_err(|_| ParcelError::InvalidLength {
            offset,
            length: i64::from(raw),
        })?;
        if length > max {
            return Err(ParcelError::LimitExceeded {
                offset,
                limit,
                max,
                found: length,
            });
        }
        Ok(length)
    }

    /// Reads a string slot; `None` means the writer stored an absent string.
    pub fn read_string(&mut self) -> Result<Option<String>, ParcelError> {
        let offset = self.pos;
        let raw = self.read_i32()?;
        if raw == ABSENT_LENGTH {
            return Ok(None);
        }
        let length = usize::try_from(raw).map_err(|_| ParcelError::InvalidLength {
            offset,
            length: i64::from(raw),
        })?;
        if length > self.limits.max_string_bytes {
            return Err(ParcelError::LimitExceeded {
                offset,
                limit: "string length",
                max: self.limits.max_string_bytes,
                found: length,
            });
        }

        let start = self.pos;
        let bytes = self.take(padded_len(length))?;
        let text = bytes.get(..length).ok_or(ParcelError::Truncated {
            offset: start,
            needed: length,
            remaining: bytes.len(),
        })?;
        let text =
            std::str::from_utf8(text).map_err(|_| ParcelError::InvalidUtf8 { offset: start })?;
        Ok(Some(text.to_owned()))
    }

    /// Reads a string slot that must be present.
    pub fn read_required_string(&mut self) -> Result<String, ParcelError> {
        let offset = self.pos;
        self.read_string()?.ok_or(ParcelError::MissingString { offset })
    }

    /// Reads the next string without advancing the cursor.
    pub fn peek_string(&self) -> Result<Option<String>, ParcelError> {
        let mut lookahead = *self;
        lookahead.read_string()
    }
}

fn padded_len(length: usize) -> usize {
    length.div_ceil(4).saturating_mul(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strings_are_length_prefixed_and_padded() {
        let mut parcel = ParcelWriter::new();
        parcel.write_string("abcde").expect("write");

        assert_eq!(
            parcel.as_bytes(),
            &[5, 0, 0, 0, b'a', b'b', b'c', b'd', b'e', 0, 0, 0]
        );

        let mut reader = ParcelReader::new(parcel.as_bytes());
        assert_eq!(reader.read_string().expect("read"), Some("abcde".to_string()));
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn empty_and_absent_strings_are_distinct() {
        let mut parcel = ParcelWriter::new();
        parcel.write_string("").expect("write");
        parcel.write_absent_string();

        let mut reader = ParcelReader::new(parcel.as_bytes());
        assert_eq!(reader.read_string().expect("empty"), Some(String::new()));
        assert_eq!(reader.read_string().expect("absent"), None);
    }

    #[test]
    fn absent_string_is_rejected_where_required() {
        let mut parcel = ParcelWriter::new();
        parcel.write_absent_string();

        let mut reader = ParcelReader::new(parcel.as_bytes());
        assert_eq!(
            reader.read_required_string(),
            Err(ParcelError::MissingString { offset: 0 })
        );
    }

    #[test]
    fn reading_past_the_end_reports_truncation() {
        let mut reader = ParcelReader::new(&[1, 0]);
        assert_eq!(
            reader.read_i32(),
            Err(ParcelError::Truncated {
                offset: 0,
                needed: 4,
                remaining: 2,
            })
        );
    }

    #[test]
    fn negative_lengths_are_invalid() {
        let mut parcel = ParcelWriter::new();
        parcel.write_i32(-7);

        let mut reader = ParcelReader::new(parcel.as_bytes());
        assert_eq!(
            reader.read_string(),
            Err(ParcelError::InvalidLength {
                offset: 0,
                length: -7,
            })
        );
    }

    #[test]
    fn string_limit_is_enforced_before_allocation() {
        let mut parcel = ParcelWriter::new();
        parcel.write_i32(i32::MAX);

        let limits = ParcelLimits {
            max_string_bytes: 16,
            ..ParcelLimits::default()
        };
        let mut reader = ParcelReader::with_limits(parcel.as_bytes(), limits);
        assert!(matches!(
            reader.read_string(),
            Err(ParcelError::LimitExceeded { max: 16, .. })
        ));
    }

    #[test]
    fn writer_refuses_strings_the_reader_would_refuse() {
        let limits = ParcelLimits {
            max_string_bytes: 8,
            ..ParcelLimits::default()
        };
        let mut parcel = ParcelWriter::with_limits(limits);
        parcel.write_string("12345678").expect("at the limit");
        assert_eq!(
            parcel.write_string("123456789"),
            Err(EventError::ExceedsLimit {
                what: "string length",
                max: 8,
                found: 9,
            })
        );

        let mut reader = ParcelReader::with_limits(parcel.as_bytes(), limits);
        assert_eq!(reader.read_string(), Ok(Some("12345678".to_string())));
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn writer_refuses_counts_above_max_entries() {
        let limits = ParcelLimits {
            max_entries: 3,
            ..ParcelLimits::default()
        };
        let mut parcel = ParcelWriter::with_limits(limits);
        parcel.write_count("list length", 3).expect("at the limit");
        assert_eq!(
            parcel.write_count("list length", 4),
            Err(EventError::ExceedsLimit {
                what: "list length",
                max: 3,
                found: 4,
            })
        );
        assert_eq!(parcel.as_bytes(), &[3, 0, 0, 0]);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let bytes = [2, 0, 0, 0, 0xff, 0xfe, 0, 0];
        let mut reader = ParcelReader::new(&bytes);
        assert_eq!(
            reader.read_string(),
            Err(ParcelError::InvalidUtf8 { offset: 4 })
        );
    }

    #[test]
    fn peek_does_not_advance() {
        let mut parcel = ParcelWriter::new();
        parcel.write_string("tag").expect("write");

        let reader = ParcelReader::new(parcel.as_bytes());
        assert_eq!(reader.peek_string().expect("peek"), Some("tag".to_string()));
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn booleans_only_accept_zero_or_one() {
        let mut parcel = ParcelWriter::new();
        parcel.write_bool(true);
        parcel.write_i32(2);

        let mut reader = ParcelReader::new(parcel.as_bytes());
        assert_eq!(reader.read_bool(), Ok(true));
        assert_eq!(
            reader.read_bool(),
            Err(ParcelError::InvalidBoolean {
                offset: 4,
                value: 2,
            })
        );
    }

    #[test]
    fn patched_slots_overwrite_the_reservation() {
        let mut parcel = ParcelWriter::new();
        let at = parcel.reserve_i32();
        parcel.write_i64(-1);
        parcel.patch_i32(at, 8);

        let mut reader = ParcelReader::new(parcel.as_bytes());
        assert_eq!(reader.read_i32(), Ok(8));
        assert_eq!(reader.read_i64(), Ok(-1));
        assert_eq!(reader.finish(), Ok(()));
    }
}
