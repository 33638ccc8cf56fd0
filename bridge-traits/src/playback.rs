//! Playback bridge traits.
//!
//! The core never decodes audio itself. Hosts supply an [`AudioBackend`] that
//! turns a URL into a single-track [`AudioHandle`] backed by the platform's
//! native player (AVAudioPlayer, MediaPlayer, an HTML audio element, ...).
//! The core owns at most one handle at a time and is responsible for
//! releasing it exactly once.

use crate::error::Result;
use async_trait::async_trait;

/// Factory for native single-track playback handles.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::playback::AudioBackend;
///
/// async fn open(backend: &dyn AudioBackend) -> bridge_traits::error::Result<()> {
///     let handle = backend.load("https://cdn.example.com/topic-1.mp3").await?;
///     handle.play().await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Load and prepare the audio at `url`.
    ///
    /// Resolves once the native player reports the source as ready to play.
    async fn load(&self, url: &str) -> Result<Box<dyn AudioHandle>>;
}

/// A loaded, single-track native playback resource.
///
/// Positions and durations are expressed in seconds.
#[async_trait]
pub trait AudioHandle: Send + Sync {
    /// Start or resume playback. Resolves once the native layer acknowledges.
    async fn play(&self) -> Result<()>;

    /// Pause playback, keeping the current position.
    async fn pause(&self) -> Result<()>;

    /// Stop playback.
    async fn stop(&self) -> Result<()>;

    /// Seek to an absolute position.
    async fn seek(&self, seconds: f64) -> Result<()>;

    /// Current playback position.
    async fn current_time(&self) -> Result<f64>;

    /// Total duration reported by the decoder, if known.
    fn duration(&self) -> Option<f64>;

    /// Set output volume, normalized to `0.0..=1.0`.
    async fn set_volume(&self, level: f32) -> Result<()>;

    /// Free the native resource. Calling any other method afterwards is an
    /// error on most platforms.
    async fn release(&self) -> Result<()>;

    /// Resolves when the track reaches its natural end.
    ///
    /// Never resolves if playback is stopped or the handle is released first.
    async fn finished(&self);
}
