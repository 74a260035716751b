use thiserror::Error;

/// Low-level failures raised while reading a parcel buffer.
///
/// Every variant carries the byte offset at which the problem was detected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParcelError {
    #[error("truncated parcel at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("invalid length {length} at offset {offset}")]
    InvalidLength { offset: usize, length: i64 },

    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    #[error("expected a string at offset {offset}, found an absent value")]
    MissingString { offset: usize },

    #[error("unknown value tag {tag} at offset {offset}")]
    UnknownValueTag { offset: usize, tag: i32 },

    #[error("bundle at offset {offset} has magic {found:#010x}")]
    BadBundleMagic { offset: usize, found: i32 },

    #[error("boolean at offset {offset} holds {value}, expected 0 or 1")]
    InvalidBoolean { offset: usize, value: i32 },

    #[error("double at offset {offset} is not finite")]
    NonFiniteDouble { offset: usize },

    #[error("duplicate key '{key}' at offset {offset}")]
    DuplicateKey { offset: usize, key: String },

    #[error("{limit} of {found} at offset {offset} exceeds the maximum of {max}")]
    LimitExceeded {
        offset: usize,
        limit: &'static str,
        max: usize,
        found: usize,
    },

    #[error("{remaining} unread bytes after the record at offset {offset}")]
    TrailingBytes { offset: usize, remaining: usize },
}

impl ParcelError {
    /// Byte offset at which decoding failed.
    pub fn offset(&self) -> usize {
        match self {
            Self::Truncated { offset, .. }
            | Self::InvalidLength { offset, .. }
            | Self::InvalidUtf8 { offset }
            | Self::MissingString { offset }
            | Self::UnknownValueTag { offset, .. }
            | Self::BadBundleMagic { offset, .. }
            | Self::InvalidBoolean { offset, .. }
            | Self::NonFiniteDouble { offset }
            | Self::DuplicateKey { offset, .. }
            | Self::LimitExceeded { offset, .. }
            | Self::TrailingBytes { offset, .. } => *offset,
        }
    }
}

/// Errors produced while encoding or decoding telemetry events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    /// The buffer does not follow the fixed parcel layout.
    #[error("malformed record: {0}")]
    MalformedRecord(#[from] ParcelError),

    /// The layout was intact but a field carried a value no encoder produces.
    #[error("malformed record: field '{field}' {reason}")]
    MalformedField { field: &'static str, reason: String },

    #[error("unsupported payload value at '{path}': {kind}")]
    UnsupportedValueKind { path: String, kind: String },

    #[error("payload nesting at '{path}' exceeds the limit of {limit} levels")]
    NestingTooDeep { path: String, limit: usize },

    #[error("{what} of {length} bytes does not fit in a parcel length slot")]
    Oversized { what: &'static str, length: usize },

    /// Encoding would produce a parcel the reader rejects under the same
    /// [`ParcelLimits`](crate::parcel::ParcelLimits).
    #[error("{what} of {found} exceeds the encode limit of {max}")]
    ExceedsLimit {
        what: &'static str,
        max: usize,
        found: usize,
    },

    #[error("unknown event type '{0}'")]
    UnknownEventType(String),
}

impl EventError {
    /// Whether the error describes an input buffer that was not produced by
    /// a conforming encoder.
    ///
    /// An unknown event type counts: every type this crate encodes is also
    /// one it decodes.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord(_) | Self::MalformedField { .. } | Self::UnknownEventType(_)
        )
    }
}
