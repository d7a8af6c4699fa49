//! Engine configuration
//!
//! The engine is configured with a single structured JSON blob supplied at
//! startup. An absent or malformed blob is a startup error; the consumer
//! never starts fetching without a working engine.

use crate::error::EngineError;
use serde::Deserialize;

fn default_timeout_secs() -> u64 {
    60
}

/// Parsed engine configuration blob.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the engine service, e.g. `http://engine:8250`.
    pub endpoint: String,

    /// Optional bearer token for the engine API.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-call timeout. Long-running ingests beyond this are the engine's
    /// problem to report, not ours to wait on forever.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Emit a debug line per engine call.
    #[serde(default)]
    pub verbose_logging: bool,
}

impl EngineConfig {
    pub fn from_json(blob: &str) -> Result<Self, EngineError> {
        serde_json::from_str(blob).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_blob() {
        let config = EngineConfig::from_json(r#"{"endpoint": "http://engine:8250"}"#).unwrap();

        assert_eq!(config.endpoint, "http://engine:8250");
        assert_eq!(config.api_key, None);
        assert_eq!(config.timeout_secs, 60);
        assert!(!config.verbose_logging);
    }

    #[test]
    fn test_full_blob() {
        let blob = r#"{
            "endpoint": "https://engine.internal",
            "api_key": "secret",
            "timeout_secs": 120,
            "verbose_logging": true
        }"#;
        let config = EngineConfig::from_json(blob).unwrap();

        assert_eq!(config.endpoint, "https://engine.internal");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.timeout_secs, 120);
        assert!(config.verbose_logging);
    }

    #[test]
    fn test_malformed_blob_is_config_error() {
        let err = EngineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_endpoint_is_config_error() {
        let err = EngineConfig::from_json(r#"{"api_key": "secret"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
