//! # Event Bus System
//!
//! Provides an event-driven architecture for the listening core using
//! `tokio::sync::broadcast`. The playback engine publishes what happened; the
//! progress tracker and the UI layer subscribe independently.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   emit    ┌───────────┐   subscribe   ┌─────────────────┐
//! │ PlaybackEngine ├──────────>│           ├──────────────>│ ProgressTracker │
//! └────────────────┘           │ EventBus  │               └─────────────────┘
//!                              │ (broadcast│
//! ┌────────────────┐   emit    │  channel) │   subscribe   ┌─────────────────┐
//! │ ProgressTracker├──────────>│           ├──────────────>│   UI bindings   │
//! └────────────────┘           └───────────┘               └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, PlaybackState};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Playback(PlaybackEvent::StateChanged {
//!         topic_id: Some("topic-1".to_string()),
//!         state: PlaybackState::Loading,
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! ## Event Types
//!
//! ### Playback Events
//! - `StateChanged`: the engine moved to a new [`PlaybackState`]
//! - `ProgressUpdated`: position snapshot (seek or poll)
//! - `Error`: a coded error, with a retry hint for the UI
//! - `Completed`: the track reached its natural end
//!
//! ### Progress Events
//! - `Saved`: a position was persisted
//! - `TopicCompleted`: a topic crossed the completion threshold
//! - `Cleared`: stored progress was removed
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep
//!   receiving.
//! - **`RecvError::Closed`**: all senders are gone; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback engine events
    Playback(PlaybackEvent),
    /// Progress persistence events
    Progress(ProgressEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Progress(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { retryable: true, .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Progress(ProgressEvent::TopicCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Topic the event refers to, when there is one.
    pub fn topic_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Playback(PlaybackEvent::StateChanged { topic_id, .. })
            | CoreEvent::Playback(PlaybackEvent::Error { topic_id, .. })
            | CoreEvent::Progress(ProgressEvent::Cleared { topic_id }) => topic_id.as_deref(),
            CoreEvent::Playback(PlaybackEvent::ProgressUpdated { topic_id, .. })
            | CoreEvent::Playback(PlaybackEvent::Completed { topic_id })
            | CoreEvent::Progress(ProgressEvent::Saved { topic_id, .. })
            | CoreEvent::Progress(ProgressEvent::TopicCompleted { topic_id }) => Some(topic_id),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Playback State & Error Codes
// ============================================================================

/// Playback engine lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Error,
}

impl PlaybackState {
    /// Returns `true` when position-dependent controls (seek) apply.
    pub fn is_seekable(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Error taxonomy shared by the engine and the progress layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LoadError,
    PlayError,
    PauseError,
    StopError,
    StorageError,
}

impl ErrorCode {
    /// Whether the UI should offer a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LoadError | Self::PlayError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadError => "LOAD_ERROR",
            Self::PlayError => "PLAY_ERROR",
            Self::PauseError => "PAUSE_ERROR",
            Self::StopError => "STOP_ERROR",
            Self::StorageError => "STORAGE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events published by the playback engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The engine changed state.
    StateChanged {
        /// Topic of the current session, if any.
        topic_id: Option<String>,
        /// New state.
        state: PlaybackState,
    },
    /// Position snapshot.
    ProgressUpdated {
        topic_id: String,
        /// Seconds from the start of the track.
        current_position: f64,
        /// Track length in seconds.
        duration: f64,
        /// `0.0..=100.0`
        percentage: f64,
    },
    /// Playback error occurred.
    Error {
        topic_id: Option<String>,
        code: ErrorCode,
        /// Human-readable error message.
        message: String,
        /// Whether the UI should offer a retry.
        retryable: bool,
    },
    /// Track finished playing naturally.
    Completed { topic_id: String },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::StateChanged { .. } => "Playback state changed",
            PlaybackEvent::ProgressUpdated { .. } => "Playback position updated",
            PlaybackEvent::Error { .. } => "Playback error",
            PlaybackEvent::Completed { .. } => "Playback completed",
        }
    }
}

// ============================================================================
// Progress Events
// ============================================================================

/// Events published by the progress tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum ProgressEvent {
    /// A listening position was persisted.
    Saved {
        topic_id: String,
        position_seconds: f64,
    },
    /// A topic crossed the completion threshold.
    TopicCompleted { topic_id: String },
    /// Stored progress was removed; `None` means everything.
    Cleared { topic_id: Option<String> },
}

impl ProgressEvent {
    fn description(&self) -> &str {
        match self {
            ProgressEvent::Saved { .. } => "Listening progress saved",
            ProgressEvent::TopicCompleted { .. } => "Topic completed",
            ProgressEvent::Cleared { .. } => "Listening progress cleared",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers. Publishers that don't care whether
    /// anyone is listening call `.ok()` on the result.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let playback_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Playback(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
