//! Playable topic descriptor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An audio item the user can listen to.
///
/// Owned by the caller; the engine clones it into the session and only reads
/// it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub audio_url: String,
    /// Catalog duration. Used when the native player cannot report one.
    pub duration_seconds: f64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Topic {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        audio_url: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            audio_url: audio_url.into(),
            duration_seconds,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Catalog duration if it is usable for clamping and ratios.
    pub fn known_duration(&self) -> Option<f64> {
        (self.duration_seconds.is_finite() && self.duration_seconds > 0.0)
            .then_some(self.duration_seconds)
    }
}
