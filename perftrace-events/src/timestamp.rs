//! Creation timestamps in the `yyyy-MM-ddTHH:mm:ss.SSS±HHMM` form.
//!
//! The pattern is rendered through `chrono`'s strftime specifiers, which are
//! locale independent, so the output only varies with the clock and the
//! host's UTC offset.

use chrono::{DateTime, FixedOffset, Local, TimeZone};

/// strftime pattern used for the `created` field.
pub const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Rendered width of [`CREATED_FORMAT`] for four-digit years.
const CREATED_LEN: usize = 28;

/// Formats the current local time.
pub fn now() -> String {
    format(&Local::now())
}

pub fn format<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format(CREATED_FORMAT).to_string()
}

/// Parses a `created` value, rejecting anything [`format`] would not produce.
pub fn parse(created: &str) -> Option<DateTime<FixedOffset>> {
    if created.len() != CREATED_LEN || !created.is_ascii() {
        return None;
    }
    DateTime::parse_from_str(created, CREATED_FORMAT).ok()
}
