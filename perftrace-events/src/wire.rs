//! Field names used by the textual wire encoding.
//!
//! The telemetry backend keys records by these names, so they are part of
//! the external contract and decoupled from the Rust field names.

pub const EVENT: &str = "event";
pub const CREATED: &str = "created";
pub const SESSION_ID: &str = "sessionId";
pub const DATA: &str = "data";

/// All wire fields in encoding order.
pub const FIELDS: &[&str] = &[EVENT, CREATED, SESSION_ID, DATA];
