//! Playback session bookkeeping.
//!
//! A session ties one [`Topic`] to at most one native handle. The engine
//! keeps zero or one session; replacing or clearing it is the only way a
//! handle leaves the engine, and the handle is moved out with
//! [`Option::take`] so exactly one code path releases it.

use crate::topic::Topic;
use bridge_traits::AudioHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time playback position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub topic_id: String,
    /// Seconds from the start of the track.
    pub position: f64,
    /// Track length in seconds, `0.0` when unknown.
    pub duration: f64,
    /// `0.0..=100.0`
    pub percentage: f64,
}

impl PositionSnapshot {
    pub fn new(topic_id: impl Into<String>, position: f64, duration: f64) -> Self {
        let percentage = if duration > 0.0 {
            (position / duration * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        Self {
            topic_id: topic_id.into(),
            position,
            duration,
            percentage,
        }
    }
}

pub(crate) struct PlaybackSession {
    pub(crate) id: SessionId,
    pub(crate) topic: Topic,
    pub(crate) generation: u64,
    handle: Option<Arc<dyn AudioHandle>>,
    end_watch: Option<JoinHandle<()>>,
}

impl PlaybackSession {
    pub(crate) fn new(topic: Topic, generation: u64) -> Self {
        Self {
            id: SessionId::new(),
            topic,
            generation,
            handle: None,
            end_watch: None,
        }
    }

    pub(crate) fn handle(&self) -> Option<Arc<dyn AudioHandle>> {
        self.handle.clone()
    }

    pub(crate) fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn attach(&mut self, handle: Arc<dyn AudioHandle>) {
        self.handle = Some(handle);
    }

    pub(crate) fn take_handle(&mut self) -> Option<Arc<dyn AudioHandle>> {
        self.handle.take()
    }

    pub(crate) fn set_end_watch(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.end_watch.replace(task) {
            previous.abort();
        }
    }

    /// Forget the watcher without aborting it. Used by the watcher itself.
    pub(crate) fn detach_end_watch(&mut self) {
        self.end_watch.take();
    }

    /// Abort the end watcher and hand back the handle for release.
    pub(crate) fn dismantle(mut self) -> Option<Arc<dyn AudioHandle>> {
        if let Some(task) = self.end_watch.take() {
            task.abort();
        }
        self.handle.take()
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let Some(task) = self.end_watch.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("topic_id", &self.topic.id)
            .field("generation", &self.generation)
            .field("has_handle", &self.handle.is_some())
            .finish()
    }
}

/// Release a native handle, logging instead of failing.
pub(crate) async fn release_handle(
    handle: Arc<dyn AudioHandle>,
    timeout: Duration,
    topic_id: &str,
) {
    match tokio::time::timeout(timeout, handle.release()).await {
        Ok(Ok(())) => debug!(topic_id, "Released audio handle"),
        Ok(Err(e)) => warn!(topic_id, error = %e, "Audio handle release failed"),
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(topic_id, timeout_ms, "Audio handle release timed out");
        }
    }
}
