//! # Progress Configuration
//!
//! Thresholds for persisting and interpreting listening progress.

use crate::error::{ProgressError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Progress tracking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// How often the tracker reads the position while a topic plays.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Minimum distance, in seconds, from the last saved position before
    /// another write is made.
    ///
    /// Default: 10.0.
    #[serde(default = "default_min_save_delta")]
    pub min_save_delta: f64,

    /// Fraction of the duration at which a topic counts as completed.
    ///
    /// Default: 0.95.
    #[serde(default = "default_completion_ratio")]
    pub completion_ratio: f64,

    /// Saved position, in seconds, from which the UI offers to resume.
    ///
    /// Default: 30.0.
    #[serde(default = "default_resume_threshold")]
    pub resume_threshold: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            min_save_delta: default_min_save_delta(),
            completion_ratio: default_completion_ratio(),
            resume_threshold: default_resume_threshold(),
        }
    }
}

impl ProgressConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ProgressError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if !self.min_save_delta.is_finite() || self.min_save_delta < 0.0 {
            return Err(ProgressError::InvalidConfig(format!(
                "min_save_delta must be a non-negative number, got {}",
                self.min_save_delta
            )));
        }
        if !(self.completion_ratio > 0.0 && self.completion_ratio <= 1.0) {
            return Err(ProgressError::InvalidConfig(format!(
                "completion_ratio must be within (0.0, 1.0], got {}",
                self.completion_ratio
            )));
        }
        if !self.resume_threshold.is_finite() || self.resume_threshold < 0.0 {
            return Err(ProgressError::InvalidConfig(format!(
                "resume_threshold must be a non-negative number, got {}",
                self.resume_threshold
            )));
        }
        Ok(())
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_min_save_delta() -> f64 {
    10.0
}

fn default_completion_ratio() -> f64 {
    0.95
}

fn default_resume_threshold() -> f64 {
    30.0
}
