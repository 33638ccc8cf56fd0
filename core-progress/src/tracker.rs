//! # Progress Tracker
//!
//! Follows the playback engine and turns positions into throttled progress
//! writes.
//!
//! ## Flow
//!
//! ```text
//! PlaybackEngine ── StateChanged/Completed ──> tracker listener
//!        ▲                                          │
//!        │ report_progress() every poll_interval    │ start/stop/flush
//!        └──────────────── poll task <──────────────┘
//!                              │
//!                              ▼
//!                 update_progress ──> ProgressStore
//! ```
//!
//! Only one topic is tracked at a time. Each `start_tracking` opens a new
//! play session in the store and resets the throttle; polling is an explicit
//! task cancelled through a [`CancellationToken`] on `stop_tracking` or when
//! the tracker is dropped.
//!
//! Storage failures are logged with `STORAGE_ERROR` and never reach the
//! playback path.

use crate::config::ProgressConfig;
use crate::store::ProgressStore;
use async_trait::async_trait;
use core_playback::{PlaybackEngine, PositionSnapshot, Topic};
use core_runtime::events::{
    CoreEvent, ErrorCode, EventBus, PlaybackEvent, PlaybackState, ProgressEvent, RecvError,
};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the tracker reads positions from.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Topic of the current playback session.
    fn current_topic(&self) -> Option<Topic>;

    /// Position without side effects.
    async fn current_position(&self) -> Option<PositionSnapshot>;

    /// Position, also published to UI subscribers.
    async fn report_progress(&self) -> Option<PositionSnapshot>;
}

#[async_trait]
impl PositionSource for PlaybackEngine {
    fn current_topic(&self) -> Option<Topic> {
        PlaybackEngine::current_topic(self)
    }

    async fn current_position(&self) -> Option<PositionSnapshot> {
        PlaybackEngine::current_position(self).await
    }

    async fn report_progress(&self) -> Option<PositionSnapshot> {
        PlaybackEngine::report_progress(self).await
    }
}

#[derive(Default)]
struct TrackingState {
    /// Bumped on every start/stop so stale poll ticks drop their result.
    epoch: u64,
    topic: Option<Topic>,
    /// Last positive duration the native player reported for `topic`.
    reported_duration: Option<f64>,
    last_saved: f64,
    completion_fired: bool,
    poll: Option<CancellationToken>,
}

impl TrackingState {
    fn is_tracking(&self, topic_id: &str) -> bool {
        self.topic.as_ref().is_some_and(|t| t.id == topic_id)
    }

    /// Native duration when known, else the catalog's.
    fn duration(&self) -> Option<f64> {
        self.reported_duration
            .or_else(|| self.topic.as_ref().and_then(Topic::known_duration))
    }

    fn note_snapshot(&mut self, snapshot: &PositionSnapshot) {
        if snapshot.duration.is_finite() && snapshot.duration > 0.0 {
            self.reported_duration = Some(snapshot.duration);
        }
    }

    fn cancel_poll(&mut self) -> bool {
        match self.poll.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

struct TrackerInner {
    store: Arc<ProgressStore>,
    source: Arc<dyn PositionSource>,
    events: EventBus,
    config: ProgressConfig,
    state: Mutex<TrackingState>,
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        self.state.get_mut().cancel_poll();
    }
}

impl TrackerInner {
    async fn poll_once(&self, epoch: u64) {
        let Some(snapshot) = self.source.report_progress().await else {
            return;
        };

        let mut state = self.state.lock().await;
        if state.epoch != epoch || !state.is_tracking(&snapshot.topic_id) {
            return;
        }
        state.note_snapshot(&snapshot);
        self.apply_position(&mut state, snapshot.position, false)
            .await;
    }

    /// Throttled save plus the once-per-session completion check.
    async fn apply_position(&self, state: &mut TrackingState, position: f64, force: bool) {
        let Some(topic) = state.topic.clone() else {
            return;
        };
        if !position.is_finite() {
            warn!(topic_id = %topic.id, position, "Ignoring non-finite position");
            return;
        }

        let duration = state.duration();

        if force || (position - state.last_saved).abs() >= self.config.min_save_delta {
            match self.store.save_progress(&topic.id, position, duration).await {
                Ok(record) => {
                    state.last_saved = record.position_seconds;
                    self.emit(ProgressEvent::Saved {
                        topic_id: topic.id.clone(),
                        position_seconds: record.position_seconds,
                    });
                }
                Err(e) => warn!(
                    topic_id = %topic.id,
                    code = %ErrorCode::StorageError,
                    error = %e,
                    "Failed to save progress"
                ),
            }
        }

        if let Some(duration) = duration {
            if !state.completion_fired && position / duration >= self.config.completion_ratio {
                state.completion_fired = true;
                self.complete(&topic.id).await;
            }
        }
    }

    async fn complete(&self, topic_id: &str) {
        match self.store.mark_completed(topic_id).await {
            Ok(_) => {
                info!(topic_id, "Topic completed");
                self.emit(ProgressEvent::TopicCompleted {
                    topic_id: topic_id.to_string(),
                });
            }
            Err(e) => warn!(
                topic_id,
                code = %ErrorCode::StorageError,
                error = %e,
                "Failed to mark topic completed"
            ),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.events.emit(CoreEvent::Progress(event));
    }
}

/// Cheap to clone; clones share tracking state.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

impl ProgressTracker {
    pub fn new(
        store: Arc<ProgressStore>,
        source: Arc<dyn PositionSource>,
        events: EventBus,
        config: ProgressConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                store,
                source,
                events,
                config,
                state: Mutex::new(TrackingState::default()),
            }),
        }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.inner.config
    }

    pub async fn tracked_topic_id(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .await
            .topic
            .as_ref()
            .map(|t| t.id.clone())
    }

    pub async fn is_tracking(&self) -> bool {
        self.inner.state.lock().await.poll.is_some()
    }

    pub async fn last_saved_position(&self) -> f64 {
        self.inner.state.lock().await.last_saved
    }

    /// Track `topic`, replacing whatever was tracked before.
    pub async fn start_tracking(&self, topic: Topic) {
        let mut state = self.inner.state.lock().await;
        state.cancel_poll();
        state.epoch += 1;
        state.last_saved = 0.0;
        state.completion_fired = false;
        state.reported_duration = None;

        self.inner.store.begin_play_session(&topic.id).await;

        let cancel = CancellationToken::new();
        self.spawn_poll(state.epoch, cancel.clone());
        state.poll = Some(cancel);

        info!(topic_id = %topic.id, "Progress tracking started");
        state.topic = Some(topic);
    }

    /// Stop polling. Idempotent.
    pub async fn stop_tracking(&self) {
        let mut state = self.inner.state.lock().await;
        state.epoch += 1;
        let topic = state.topic.take();
        state.reported_duration = None;
        if state.cancel_poll() {
            debug!(
                topic_id = topic.as_ref().map(|t| t.id.as_str()).unwrap_or_default(),
                "Progress tracking stopped"
            );
        }
    }

    /// Report a position for the tracked topic.
    ///
    /// Persisted only when it moved at least `min_save_delta` from the last
    /// saved position. Ignored when nothing is tracked.
    pub async fn update_progress(&self, position: f64) {
        let mut state = self.inner.state.lock().await;
        self.inner.apply_position(&mut state, position, false).await;
    }

    /// Save the current position regardless of the throttle.
    pub async fn flush(&self) {
        let mut state = self.inner.state.lock().await;
        let Some(topic_id) = state.topic.as_ref().map(|t| t.id.clone()) else {
            return;
        };

        match self.inner.source.current_position().await {
            Some(snapshot) if snapshot.topic_id == topic_id => {
                state.note_snapshot(&snapshot);
                self.inner
                    .apply_position(&mut state, snapshot.position, true)
                    .await;
            }
            _ => debug!(topic_id = %topic_id, "No position to flush"),
        }
    }

    /// The track reached its natural end.
    pub async fn handle_playback_completed(&self, topic_id: &str) {
        let mut state = self.inner.state.lock().await;

        if state.is_tracking(topic_id) {
            if let Some(duration) = state.duration() {
                self.inner.apply_position(&mut state, duration, true).await;
            }
            if !state.completion_fired {
                state.completion_fired = true;
                self.inner.complete(topic_id).await;
            }
        } else {
            self.inner.complete(topic_id).await;
        }
    }

    /// React to one engine event.
    pub async fn handle_event(&self, event: &CoreEvent) {
        let CoreEvent::Playback(event) = event else {
            return;
        };

        match event {
            PlaybackEvent::StateChanged { topic_id, state } => match state {
                PlaybackState::Playing => {
                    if let Some(topic_id) = topic_id {
                        self.on_playing(topic_id).await;
                    }
                }
                PlaybackState::Paused => self.flush().await,
                PlaybackState::Loading
                | PlaybackState::Stopped
                | PlaybackState::Idle
                | PlaybackState::Error => self.stop_tracking().await,
            },
            PlaybackEvent::Completed { topic_id } => {
                self.handle_playback_completed(topic_id).await
            }
            PlaybackEvent::ProgressUpdated { .. } | PlaybackEvent::Error { .. } => {}
        }
    }

    async fn on_playing(&self, topic_id: &str) {
        {
            let state = self.inner.state.lock().await;
            if state.is_tracking(topic_id) && state.poll.is_some() {
                // Resumed from pause: same play session.
                return;
            }
        }

        match self.inner.source.current_topic() {
            Some(topic) if topic.id == topic_id => self.start_tracking(topic).await,
            _ => debug!(topic_id, "Playing topic is no longer current"),
        }
    }

    /// Follow engine events on the bus until the tracker is dropped.
    pub fn attach(&self) -> JoinHandle<()> {
        let weak: Weak<TrackerInner> = Arc::downgrade(&self.inner);
        let mut rx = self.inner.events.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        ProgressTracker { inner }.handle_event(&event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Progress tracker fell behind playback events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Progress listener exited");
        })
    }

    fn spawn_poll(&self, epoch: u64, cancel: CancellationToken) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        inner.poll_once(epoch).await;
                    }
                }
            }
            debug!(epoch, "Progress polling ended");
        });
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
