//! # Engine Configuration
//!
//! Tunables for the playback engine.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Volume applied to each newly loaded handle until `set_volume` is
    /// called, normalized to `0.0..=1.0`.
    ///
    /// Default: 1.0.
    #[serde(default = "default_volume")]
    pub default_volume: f32,

    /// Upper bound on a single native `release()` call.
    ///
    /// A release that takes longer is abandoned and logged; the engine has
    /// already dropped its reference by then.
    ///
    /// Default: 2 seconds.
    #[serde(default = "default_release_timeout")]
    pub release_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            release_timeout: default_release_timeout(),
        }
    }
}

impl EngineConfig {
    /// Check values are within range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(PlaybackError::InvalidConfig(format!(
                "default_volume must be within 0.0..=1.0, got {}",
                self.default_volume
            )));
        }

        if self.release_timeout.is_zero() {
            return Err(PlaybackError::InvalidConfig(
                "release_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_volume() -> f32 {
    1.0
}

fn default_release_timeout() -> Duration {
    Duration::from_secs(2)
}
