//! Shared traits and helper types reused across the perftrace crates. The
//! goal is to keep event producers decoupled from whatever delivers their
//! telemetry while still sharing a common contract.

pub mod reference;
pub mod telemetry;

pub use reference::MemoryTelemetry;
pub use telemetry::{NoopTelemetry, TelemetrySink};
