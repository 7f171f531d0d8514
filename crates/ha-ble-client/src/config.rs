//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use ha_ble_protocol::IdLayout;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default time to wait for a reply before re-sending (milliseconds).
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 2000;

/// Default number of re-sends before giving up on an exchange.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Configuration for one controller link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Link name, used in logs and metric labels.
    pub name: String,
    /// Which byte of a device id holds the zone and type fields.
    pub id_layout: IdLayout,
    /// Time to wait for a reply to a device-list request.
    pub response_timeout_ms: u64,
    /// Re-sends of an unanswered request before reporting a timeout.
    pub max_retries: u32,
    /// Report truncated notifications to the result sink instead of only logging them.
    pub report_truncated_frames: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            name: "controller".to_string(),
            id_layout: IdLayout::default(),
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            report_truncated_frames: false,
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "response_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Response timeout as a [`Duration`].
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.id_layout, IdLayout::ZoneMajor);
        assert_eq!(config.response_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_retries, 1);
        assert!(!config.report_truncated_frames);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = EngineConfig::from_yaml_str(
            "name: hall\nid_layout: zone_in_endpoint_byte\n",
        )
        .unwrap();
        assert_eq!(config.name, "hall");
        assert_eq!(config.id_layout, IdLayout::ZoneInEndpointByte);
        assert_eq!(config.response_timeout_ms, DEFAULT_RESPONSE_TIMEOUT_MS);
    }

    #[test]
    fn test_rejects_unknown_layout() {
        let err = EngineConfig::from_yaml_str("id_layout: node_major\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = EngineConfig::from_yaml_str("response_timeout_ms: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/ha-ble.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/ha-ble.yaml"));
    }
}
