//! # Playback Error Types
//!
//! Errors surfaced by the playback engine. Only load and play failures reject
//! a control operation; pause, stop and release failures are logged by the
//! engine and never reach the caller.

use bridge_traits::BridgeError;
use core_runtime::events::ErrorCode;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The native backend could not load the topic's audio.
    #[error("Failed to load audio for topic {topic_id}: {source}")]
    Load {
        topic_id: String,
        #[source]
        source: BridgeError,
    },

    /// The audio loaded but the native player refused to start.
    #[error("Failed to start playback for topic {topic_id}: {source}")]
    Play {
        topic_id: String,
        #[source]
        source: BridgeError,
    },

    /// A later `play()`, `stop()` or `cleanup()` replaced this request before
    /// it completed. Engine state belongs to the newer request.
    #[error("Playback request for topic {topic_id} was superseded")]
    Superseded { topic_id: String },

    /// Attempted an operation that needs a loaded track.
    #[error("No active playback session")]
    NoActiveSession,

    // ========================================================================
    // Input Errors
    // ========================================================================
    /// Volume was not a number.
    #[error("Invalid volume: {0} (must be between 0.0 and 1.0)")]
    InvalidVolume(f32),

    /// Engine configuration rejected by `EngineConfig::validate`.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Native bridge call failed outside the load/play path.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl PlaybackError {
    /// Error code reported to the UI, if this error maps to one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            PlaybackError::Load { .. } => Some(ErrorCode::LoadError),
            PlaybackError::Play { .. } => Some(ErrorCode::PlayError),
            _ => None,
        }
    }

    /// Returns `true` if re-issuing `play()` may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlaybackError::Load { .. } | PlaybackError::Play { .. })
    }

    /// Returns `true` if the request lost a race with a newer command.
    pub fn is_superseded(&self) -> bool {
        matches!(self, PlaybackError::Superseded { .. })
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_retry_hints() {
        let load = PlaybackError::Load {
            topic_id: "t1".into(),
            source: BridgeError::OperationFailed("404".into()),
        };
        assert_eq!(load.code(), Some(ErrorCode::LoadError));
        assert!(load.is_retryable());
        assert!(load.to_string().contains("t1"));

        let superseded = PlaybackError::Superseded {
            topic_id: "t1".into(),
        };
        assert_eq!(superseded.code(), None);
        assert!(!superseded.is_retryable());
        assert!(superseded.is_superseded());

        let bridge: PlaybackError = BridgeError::Released.into();
        assert!(!bridge.is_retryable());
    }
}
