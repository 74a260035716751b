use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::event::TelemetryEvent;
use crate::parcel::ParcelLimits;

/// Embedder-facing switches for event emission and transport bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Emit performance trace events
    #[serde(default = "default_true")]
    pub perf_events: bool,

    /// Level used by the log and tracing emitters
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bounds applied by the parcel codec. Only [`Self::encode_event`] and
    /// [`Self::decode_event`] read them; the plain `encode`/`decode` calls
    /// use [`ParcelLimits::default`].
    #[serde(default)]
    pub parcel: ParcelLimits,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            perf_events: true,
            log_level: default_log_level(),
            parcel: ParcelLimits::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TelemetryConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse telemetry config")
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read telemetry config: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid telemetry config: {}", path.display()))
    }

    /// Parses [`Self::log_level`] for the tracing emitter.
    pub fn level(&self) -> Result<tracing::Level> {
        self.log_level
            .parse::<tracing::Level>()
            .map_err(|err| anyhow!("Invalid log level '{}': {err}", self.log_level))
    }

    /// Encodes `event` under the configured [`ParcelLimits`].
    pub fn encode_event(&self, event: &TelemetryEvent) -> Result<Vec<u8>, EventError> {
        event.encode_with(self.parcel)
    }

    /// Decodes a parcel under the configured [`ParcelLimits`].
    pub fn decode_event(&self, bytes: &[u8]) -> Result<TelemetryEvent, EventError> {
        TelemetryEvent::decode_with(bytes, self.parcel)
    }

    /// Whether `event` should reach emitters under this configuration.
    pub fn should_emit(&self, event: &TelemetryEvent) -> bool {
        match event {
            TelemetryEvent::PerformanceTrace(_) => self.perf_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::PerformanceTraceEvent;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_yields_defaults() {
        let config = TelemetryConfig::from_toml_str("").expect("parse");
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.level().expect("level"), tracing::Level::INFO);
    }

    #[test]
    fn partial_parcel_table_keeps_other_defaults() {
        let config = TelemetryConfig::from_toml_str(
            r#"
                perf_events = false
                log_level = "debug"

                [parcel]
                max_depth = 4
            "#,
        )
        .expect("parse");

        assert!(!config.perf_events);
        assert_eq!(config.level().expect("level"), tracing::Level::DEBUG);
        assert_eq!(
            config.parcel,
            ParcelLimits {
                max_depth: 4,
                ..ParcelLimits::default()
            }
        );
    }

    #[test]
    fn unknown_level_is_reported() {
        let config = TelemetryConfig {
            log_level: "chatty".to_string(),
            ..TelemetryConfig::default()
        };
        let err = config.level().expect_err("invalid level");
        assert!(err.to_string().contains("chatty"), "{err}");
    }

    #[test]
    fn configured_limits_drive_the_codec() {
        let config = TelemetryConfig::from_toml_str(
            r#"
                [parcel]
                max_entries = 1
            "#,
        )
        .expect("parse");

        let mut data = crate::value::Payload::new();
        data.insert("a".to_string(), serde_json::json!(1));
        let single = TelemetryEvent::from(PerformanceTraceEvent::new("s", data.clone()));
        let bytes = config.encode_event(&single).expect("encode");
        assert_eq!(config.decode_event(&bytes).expect("decode"), single);

        data.insert("b".to_string(), serde_json::json!(2));
        let pair = TelemetryEvent::from(PerformanceTraceEvent::new("s", data));
        assert!(matches!(
            config.encode_event(&pair),
            Err(EventError::ExceedsLimit { max: 1, found: 2, .. })
        ));

        let wide = pair.encode().expect("default limits");
        assert!(config.decode_event(&wide).expect_err("too wide").is_malformed());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(TelemetryConfig::from_toml_str("perf_events = \"yes\"").is_err());
    }
}
