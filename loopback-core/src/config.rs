//! Configuration types and utilities

use crate::error::InterceptorError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Interceptor configuration
/// These settings are fixed at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Verbose per-event logging and the `/frames` admin route
    pub debug_mode: bool,
    /// Capacity of the actor's event queue
    pub event_channel_capacity: usize,
    /// Admin API settings
    pub admin: AdminConfig,
    /// JSON rule catalog loaded at startup
    pub catalog_path: Option<PathBuf>,
    /// Cross-origin relay settings
    pub relay: RelayConfig,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            event_channel_capacity: 1024,
            admin: AdminConfig::default(),
            catalog_path: None,
            relay: RelayConfig::default(),
        }
    }
}

impl InterceptorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(invalid("event_channel_capacity must be greater than 0"));
        }
        if self.admin.enabled && self.admin.port == 0 {
            return Err(invalid("admin port must be non-zero when the admin API is enabled"));
        }
        if self.relay.timeout_secs == 0 {
            return Err(invalid("relay timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> InterceptorError {
    InterceptorError::Configuration(format!("validation failed: {}", reason))
}

/// Admin API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9091,
        }
    }
}

/// Cross-origin relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = InterceptorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.event_channel_capacity, 1024);
        assert_eq!(config.admin.port, 9091);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: InterceptorConfig =
            serde_json::from_str(r#"{"debug_mode": true, "relay": {"timeout_secs": 5}}"#).unwrap();
        assert!(config.debug_mode);
        assert!(config.relay.enabled);
        assert_eq!(config.relay.timeout_secs, 5);
        assert!(config.admin.enabled);
    }

    #[test]
    fn test_validation() {
        let config = InterceptorConfig {
            event_channel_capacity: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("validation failed"));

        let mut config = InterceptorConfig::default();
        config.admin.enabled = false;
        config.admin.port = 0;
        assert!(config.validate().is_ok());
        config.relay.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
