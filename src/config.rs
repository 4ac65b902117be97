//! Core configuration parameters
//!
//! Tunable parameters for the coordination core. Values are loaded from a
//! JSON document by the embedding application; out-of-range values are
//! rejected, never clamped.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    // --- Status ---
    /// Snapshot age (minutes) beyond which structured status is withheld
    pub status_freshness_minutes: u32,

    // --- Connection ---
    /// Upper bound a driver may spend on one connect / disconnect request (ms)
    pub link_request_timeout_ms: u32,
    /// Log every connection predicate query at debug level
    pub display_connection_messages: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            status_freshness_minutes: 60,
            link_request_timeout_ms: 30_000,
            display_connection_messages: false,
        }
    }
}

impl CoreConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status_freshness_minutes == 0 {
            return Err(ConfigError::ValidationFailed(
                "status_freshness_minutes must be positive",
            ));
        }
        if self.status_freshness_minutes > 24 * 60 {
            return Err(ConfigError::ValidationFailed(
                "status_freshness_minutes must not exceed one day",
            ));
        }
        if self.link_request_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "link_request_timeout_ms must be positive",
            ));
        }
        Ok(())
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.status_freshness_minutes))
    }

    pub fn link_request_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.link_request_timeout_ms))
    }
}
