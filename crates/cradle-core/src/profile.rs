//! Per-app runtime tuning.

use crate::config::Config;
use crate::error::CoreError;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Idle timeout applied when a profile does not set one.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Runtime tuning for an app, immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    /// Seconds without an invocation before a slave terminates itself.
    #[serde(default = "default_idle_timeout")]
    idle_timeout: u64,
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

impl Profile {
    /// Load the named profile from the profile directory.
    pub fn load(config: &Config, name: &str) -> Result<Self, CoreError> {
        let path = config.profile_path.join(format!("{name}.json"));

        let data = fs::read(&path).map_err(|e| CoreError::InvalidProfile {
            name: name.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;

        serde_json::from_slice(&data).map_err(|e| CoreError::InvalidProfile {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// How long a slave may sit without an invocation before evicting
    /// itself.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}
