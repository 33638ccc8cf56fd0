//! # Playback Engine
//!
//! Owns zero or one native audio handle and exposes the playback state
//! machine to the UI.
//!
//! ## State Machine
//!
//! ```text
//!            play(topic)              load ok + native play ok
//!  Idle ─────────────────> Loading ─────────────────────────────> Playing
//!  Stopped ──────────────>    │                                    │   ▲
//!  Error ────────────────>    │ load/play failure       pause()    │   │ play(same topic)
//!                             ▼                                    ▼   │
//!                           Error                                 Paused
//!
//!  Playing/Paused ── stop() ──> Stopped       any ── cleanup() ──> Idle
//!  Playing ── natural end ──> Stopped (topic retained, Completed emitted)
//! ```
//!
//! ## Superseded Requests
//!
//! Every request that replaces the current session (`play()` of a new
//! session, `stop()`, `cleanup()`) bumps a generation counter while holding
//! the state lock. Async continuations capture the generation they started
//! with and re-check it after every `.await`; on mismatch they leave state and
//! resources alone and return [`PlaybackError::Superseded`]. A handle produced
//! by a superseded load belongs to no session and is released on the spot.
//!
//! The state lock is a `parking_lot::Mutex` and is never held across an
//! `.await`.

use crate::config::EngineConfig;
use crate::error::{PlaybackError, Result};
use crate::session::{release_handle, PlaybackSession, PositionSnapshot, SessionId};
use crate::topic::Topic;
use bridge_traits::{AudioBackend, AudioHandle, BridgeError};
use core_runtime::events::{CoreEvent, ErrorCode, EventBus, PlaybackEvent, PlaybackState};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

struct EngineInner {
    state: PlaybackState,
    generation: u64,
    volume: f32,
    session: Option<PlaybackSession>,
    /// Generation of a resume waiting on the native `play()`.
    resuming: Option<u64>,
    /// A `pause()` arrived while that resume was in flight.
    pause_pending: Option<u64>,
}

struct EngineShared {
    inner: Mutex<EngineInner>,
    events: EventBus,
}

impl EngineShared {
    /// Set the state and announce it. Called with the lock held so events
    /// leave in the same order as the transitions.
    fn transition(&self, inner: &mut EngineInner, state: PlaybackState) {
        inner.state = state;
        let topic_id = inner.session.as_ref().map(|s| s.topic.id.clone());
        self.emit(PlaybackEvent::StateChanged { topic_id, state });
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is not an error for the engine.
        let _ = self.events.emit(CoreEvent::Playback(event));
    }
}

enum PlayStep {
    AlreadyPlaying,
    Resume {
        handle: Arc<dyn AudioHandle>,
        generation: u64,
    },
    Load {
        generation: u64,
        previous: Option<PlaybackSession>,
    },
}

/// Single-track playback engine.
///
/// Cheap to clone; clones share the same session and state.
#[derive(Clone)]
pub struct PlaybackEngine {
    backend: Arc<dyn AudioBackend>,
    shared: Arc<EngineShared>,
    config: EngineConfig,
}

impl PlaybackEngine {
    pub fn new(backend: Arc<dyn AudioBackend>, events: EventBus, config: EngineConfig) -> Self {
        let volume = if config.default_volume.is_nan() {
            1.0
        } else {
            config.default_volume.clamp(0.0, 1.0)
        };

        Self {
            backend,
            shared: Arc::new(EngineShared {
                inner: Mutex::new(EngineInner {
                    state: PlaybackState::Idle,
                    generation: 0,
                    volume,
                    session: None,
                    resuming: None,
                    pause_pending: None,
                }),
                events,
            }),
            config,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> PlaybackState {
        self.shared.inner.lock().state
    }

    /// Current generation. Increases whenever a session is started,
    /// resumed, or superseded.
    pub fn generation(&self) -> u64 {
        self.shared.inner.lock().generation
    }

    pub fn volume(&self) -> f32 {
        self.shared.inner.lock().volume
    }

    /// Topic of the current session. Kept after a natural end so the UI can
    /// show what just finished.
    pub fn current_topic(&self) -> Option<Topic> {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.topic.clone())
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.inner.lock().session.as_ref().map(|s| s.id)
    }

    pub fn is_topic_playing(&self, topic_id: &str) -> bool {
        self.is_topic_in_state(topic_id, PlaybackState::Playing)
    }

    pub fn is_topic_paused(&self, topic_id: &str) -> bool {
        self.is_topic_in_state(topic_id, PlaybackState::Paused)
    }

    /// Whether a native handle is currently owned.
    pub fn has_handle(&self) -> bool {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.has_handle())
    }

    fn is_topic_in_state(&self, topic_id: &str, state: PlaybackState) -> bool {
        let inner = self.shared.inner.lock();
        inner.state == state
            && inner
                .session
                .as_ref()
                .is_some_and(|s| s.topic.id == topic_id)
    }

    // ========================================================================
    // Controls
    // ========================================================================

    /// Start or resume `topic`.
    ///
    /// The engine is in `Loading` (and has announced it) before this method
    /// first yields. Resolves once native playback has started.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::Load`] / [`PlaybackError::Play`]: the engine moved
    ///   to `Error` and emitted a retryable error event
    /// - [`PlaybackError::Superseded`]: a newer command took over; nothing
    ///   was changed on behalf of this call
    #[instrument(skip(self, topic), fields(topic_id = %topic.id))]
    pub async fn play(&self, topic: &Topic) -> Result<()> {
        match self.begin_play(topic) {
            PlayStep::AlreadyPlaying => {
                debug!("Topic already playing");
                Ok(())
            }
            PlayStep::Resume { handle, generation } => {
                self.resume(topic, handle, generation).await
            }
            PlayStep::Load {
                generation,
                previous,
            } => {
                if let Some(previous) = previous {
                    debug!(previous_topic = %previous.topic.id, "Replacing session");
                    self.release_session(previous).await;
                }
                self.load_and_start(topic, generation).await
            }
        }
    }

    fn begin_play(&self, topic: &Topic) -> PlayStep {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;

        let same_topic = inner
            .session
            .as_ref()
            .is_some_and(|s| s.topic.id == topic.id);

        if same_topic {
            match inner.state {
                PlaybackState::Playing => return PlayStep::AlreadyPlaying,
                PlaybackState::Paused => {
                    let handle = inner.session.as_ref().and_then(|s| s.handle());
                    if let Some(handle) = handle {
                        inner.generation += 1;
                        let generation = inner.generation;
                        if let Some(session) = inner.session.as_mut() {
                            session.generation = generation;
                        }
                        inner.resuming = Some(generation);
                        return PlayStep::Resume { handle, generation };
                    }
                }
                _ => {}
            }
        }

        inner.generation += 1;
        let generation = inner.generation;
        let previous = inner
            .session
            .replace(PlaybackSession::new(topic.clone(), generation));
        self.shared.transition(inner, PlaybackState::Loading);

        PlayStep::Load {
            generation,
            previous,
        }
    }

    async fn resume(
        &self,
        topic: &Topic,
        handle: Arc<dyn AudioHandle>,
        generation: u64,
    ) -> Result<()> {
        let played = handle.play().await;

        let paused_meanwhile = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            if inner.generation != generation {
                return Err(PlaybackError::Superseded {
                    topic_id: topic.id.clone(),
                });
            }
            inner.resuming = None;
            let paused_meanwhile = inner.pause_pending.take() == Some(generation);

            match played {
                Ok(()) if paused_meanwhile => true,
                Ok(()) => {
                    self.shared.transition(inner, PlaybackState::Playing);
                    info!(generation, "Playback resumed");
                    false
                }
                Err(source) => {
                    return Err(self.fail(inner, ErrorCode::PlayError, &topic.id, source))
                }
            }
        };

        if paused_meanwhile {
            // Still Paused; bring the native player back in line.
            if let Err(e) = handle.pause().await {
                warn!(
                    topic_id = %topic.id,
                    code = %ErrorCode::PauseError,
                    error = %e,
                    "Pause after resume failed"
                );
                let mut guard = self.shared.inner.lock();
                let inner = &mut *guard;
                if inner.generation == generation && inner.state == PlaybackState::Paused {
                    self.shared.transition(inner, PlaybackState::Playing);
                }
            } else {
                debug!(generation, "Pause requested during resume applied");
            }
        }
        Ok(())
    }

    async fn load_and_start(&self, topic: &Topic, generation: u64) -> Result<()> {
        debug!(generation, url = %topic.audio_url, "Loading audio");

        let handle: Arc<dyn AudioHandle> = match self.backend.load(&topic.audio_url).await {
            Ok(handle) => Arc::from(handle),
            Err(source) => {
                let error = {
                    let mut guard = self.shared.inner.lock();
                    let inner = &mut *guard;
                    if inner.generation != generation {
                        debug!(generation, error = %source, "Ignoring failure of superseded load");
                        PlaybackError::Superseded {
                            topic_id: topic.id.clone(),
                        }
                    } else {
                        self.fail(inner, ErrorCode::LoadError, &topic.id, source)
                    }
                };
                return Err(error);
            }
        };

        let installed = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            if inner.generation != generation {
                None
            } else {
                let volume = inner.volume;
                inner.session.as_mut().map(|session| {
                    session.attach(Arc::clone(&handle));
                    (session.id, volume)
                })
            }
        };

        let Some((session_id, volume)) = installed else {
            debug!(generation, "Discarding handle from superseded load");
            release_handle(handle, self.config.release_timeout, &topic.id).await;
            return Err(PlaybackError::Superseded {
                topic_id: topic.id.clone(),
            });
        };

        if let Err(e) = handle.set_volume(volume).await {
            warn!(error = %e, volume, "Failed to apply volume to new handle");
        }

        let played = handle.play().await;

        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        if inner.generation != generation {
            // The superseding command owns the session and its handle now.
            return Err(PlaybackError::Superseded {
                topic_id: topic.id.clone(),
            });
        }

        match played {
            Ok(()) => {
                let watch = self.spawn_end_watch(session_id, handle);
                if let Some(session) = inner.session.as_mut() {
                    session.set_end_watch(watch);
                }
                self.shared.transition(inner, PlaybackState::Playing);
                info!(generation, %session_id, "Playback started");
                Ok(())
            }
            Err(source) => Err(self.fail(inner, ErrorCode::PlayError, &topic.id, source)),
        }
    }

    /// Move to `Error`, emit the coded error and build the caller's error.
    fn fail(
        &self,
        inner: &mut EngineInner,
        code: ErrorCode,
        topic_id: &str,
        source: BridgeError,
    ) -> PlaybackError {
        warn!(topic_id, code = %code, error = %source, "Playback failed");

        self.shared.transition(inner, PlaybackState::Error);
        self.shared.emit(PlaybackEvent::Error {
            topic_id: Some(topic_id.to_string()),
            code,
            message: source.to_string(),
            retryable: code.is_retryable(),
        });

        let topic_id = topic_id.to_string();
        match code {
            ErrorCode::LoadError => PlaybackError::Load { topic_id, source },
            _ => PlaybackError::Play { topic_id, source },
        }
    }

    /// The watcher holds the engine weakly; dropping every engine clone drops
    /// the session, which aborts the watcher.
    fn spawn_end_watch(&self, session_id: SessionId, handle: Arc<dyn AudioHandle>) -> JoinHandle<()> {
        let weak: Weak<EngineShared> = Arc::downgrade(&self.shared);
        let release_timeout = self.config.release_timeout;

        tokio::spawn(async move {
            handle.finished().await;
            drop(handle);

            let Some(shared) = weak.upgrade() else {
                return;
            };

            let ended = {
                let mut guard = shared.inner.lock();
                let inner = &mut *guard;

                let is_current = inner.state == PlaybackState::Playing
                    && inner.session.as_ref().is_some_and(|s| s.id == session_id);
                if !is_current {
                    None
                } else {
                    inner.generation += 1;
                    let (released, topic_id) = match inner.session.as_mut() {
                        Some(session) => {
                            session.detach_end_watch();
                            (session.take_handle(), session.topic.id.clone())
                        }
                        None => (None, String::new()),
                    };
                    shared.emit(PlaybackEvent::Completed {
                        topic_id: topic_id.clone(),
                    });
                    shared.transition(inner, PlaybackState::Stopped);
                    Some((released, topic_id))
                }
            };

            if let Some((released, topic_id)) = ended {
                info!(topic_id = %topic_id, "Playback reached natural end");
                if let Some(released) = released {
                    release_handle(released, release_timeout, &topic_id).await;
                }
            }
        })
    }

    /// Pause the current session. No-op unless `Playing`.
    ///
    /// A pause issued while `play()` is resuming the same session is applied
    /// once the native player has resumed, and the engine stays `Paused`.
    ///
    /// A native pause failure is logged (`PAUSE_ERROR`) and the state is left
    /// as it was.
    #[instrument(skip(self))]
    pub async fn pause(&self) {
        let target = {
            let mut inner = self.shared.inner.lock();
            if inner.state == PlaybackState::Paused && inner.resuming == Some(inner.generation) {
                inner.pause_pending = inner.resuming;
                debug!("Pause deferred until resume completes");
                return;
            }
            if inner.state != PlaybackState::Playing {
                None
            } else {
                inner.session.as_ref().and_then(|s| {
                    s.handle()
                        .map(|handle| (handle, s.topic.id.clone(), inner.generation))
                })
            }
        };

        let Some((handle, topic_id, generation)) = target else {
            debug!("Pause ignored: nothing is playing");
            return;
        };

        match handle.pause().await {
            Ok(()) => {
                let mut guard = self.shared.inner.lock();
                let inner = &mut *guard;
                if inner.generation == generation && inner.state == PlaybackState::Playing {
                    self.shared.transition(inner, PlaybackState::Paused);
                    debug!(topic_id = %topic_id, "Playback paused");
                }
            }
            Err(e) => warn!(
                topic_id = %topic_id,
                code = %ErrorCode::PauseError,
                error = %e,
                "Pause failed; state unchanged"
            ),
        }
    }

    /// Stop and release the current session.
    ///
    /// No-op in `Idle`/`Stopped` or without a session. Supersedes a pending
    /// load. Native stop/seek/release failures are logged (`STOP_ERROR`).
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let session = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            if matches!(inner.state, PlaybackState::Idle | PlaybackState::Stopped)
                || inner.session.is_none()
            {
                None
            } else {
                inner.generation += 1;
                self.shared.transition(inner, PlaybackState::Stopped);
                inner.session.take()
            }
        };

        let Some(session) = session else {
            debug!("Stop ignored: no active session");
            return;
        };

        let topic_id = session.topic.id.clone();
        if let Some(handle) = session.dismantle() {
            if let Err(e) = handle.stop().await {
                warn!(topic_id = %topic_id, code = %ErrorCode::StopError, error = %e, "Native stop failed");
            }
            if let Err(e) = handle.seek(0.0).await {
                warn!(topic_id = %topic_id, code = %ErrorCode::StopError, error = %e, "Rewind on stop failed");
            }
            release_handle(handle, self.config.release_timeout, &topic_id).await;
        }

        info!(topic_id = %topic_id, "Playback stopped");
    }

    /// Seek within the current track, clamped to `[0, duration]`.
    ///
    /// Ignored unless `Playing` or `Paused`. Emits a progress update once the
    /// native player acknowledges.
    #[instrument(skip(self))]
    pub async fn seek(&self, position: f64) {
        if !position.is_finite() {
            warn!(position, "Ignoring non-finite seek target");
            return;
        }

        let Some((handle, topic, generation)) = self.seekable_session() else {
            debug!("Seek ignored: no seekable session");
            return;
        };

        let duration = effective_duration(handle.as_ref(), &topic);
        let target = match duration {
            Some(duration) => position.clamp(0.0, duration),
            None => position.max(0.0),
        };

        if let Err(e) = handle.seek(target).await {
            warn!(topic_id = %topic.id, target, error = %e, "Seek failed");
            return;
        }

        let inner = self.shared.inner.lock();
        if inner.generation == generation {
            let snapshot = PositionSnapshot::new(topic.id, target, duration.unwrap_or(0.0));
            self.shared.emit(progress_event(&snapshot));
        }
    }

    /// Set output volume. Clamped to `[0, 1]`, applied to the live handle and
    /// to every handle loaded afterwards.
    pub async fn set_volume(&self, level: f32) -> Result<()> {
        if level.is_nan() {
            return Err(PlaybackError::InvalidVolume(level));
        }
        let level = level.clamp(0.0, 1.0);

        let handle = {
            let mut inner = self.shared.inner.lock();
            inner.volume = level;
            inner.session.as_ref().and_then(|s| s.handle())
        };

        if let Some(handle) = handle {
            handle.set_volume(level).await?;
        }
        Ok(())
    }

    /// Read the current position from the native player.
    ///
    /// `None` unless `Playing`/`Paused`, or when the native read fails.
    pub async fn current_position(&self) -> Option<PositionSnapshot> {
        let (handle, topic, _) = self.seekable_session()?;

        match handle.current_time().await {
            Ok(position) => {
                let duration = effective_duration(handle.as_ref(), &topic).unwrap_or(0.0);
                Some(PositionSnapshot::new(topic.id, position.max(0.0), duration))
            }
            Err(e) => {
                warn!(topic_id = %topic.id, error = %e, "Failed to read playback position");
                None
            }
        }
    }

    /// Read the current position and publish it as a progress update.
    pub async fn report_progress(&self) -> Option<PositionSnapshot> {
        let snapshot = self.current_position().await?;
        self.shared.emit(progress_event(&snapshot));
        Some(snapshot)
    }

    /// Release everything and return to `Idle`. Never fails.
    ///
    /// Safe to call from shutdown paths and repeatedly.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) {
        let session = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            inner.generation += 1;
            let session = inner.session.take();
            if inner.state != PlaybackState::Idle {
                self.shared.transition(inner, PlaybackState::Idle);
            }
            session
        };

        if let Some(session) = session {
            self.release_session(session).await;
        }
        debug!("Playback engine cleaned up");
    }

    async fn release_session(&self, session: PlaybackSession) {
        let topic_id = session.topic.id.clone();
        if let Some(handle) = session.dismantle() {
            release_handle(handle, self.config.release_timeout, &topic_id).await;
        }
    }

    fn seekable_session(&self) -> Option<(Arc<dyn AudioHandle>, Topic, u64)> {
        let inner = self.shared.inner.lock();
        if !inner.state.is_seekable() {
            return None;
        }
        let session = inner.session.as_ref()?;
        let handle = session.handle()?;
        Some((handle, session.topic.clone(), inner.generation))
    }
}

impl fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("PlaybackEngine")
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("volume", &inner.volume)
            .field("session", &inner.session)
            .finish()
    }
}

/// Native duration when reported, else the catalog's.
fn effective_duration(handle: &dyn AudioHandle, topic: &Topic) -> Option<f64> {
    handle
        .duration()
        .filter(|d| d.is_finite() && *d > 0.0)
        .or_else(|| topic.known_duration())
}

fn progress_event(snapshot: &PositionSnapshot) -> PlaybackEvent {
    PlaybackEvent::ProgressUpdated {
        topic_id: snapshot.topic_id.clone(),
        current_position: snapshot.position,
        duration: snapshot.duration,
        percentage: snapshot.percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeHandleOptions};
    use core_runtime::events::Receiver;
    use std::time::Duration;

    fn topic(id: &str) -> Topic {
        Topic::new(id, format!("Topic {id}"), format!("https://cdn.test/{id}.mp3"), 300.0)
    }

    fn engine_with(backend: Arc<FakeBackend>) -> (PlaybackEngine, Receiver<CoreEvent>) {
        let events = EventBus::new(64);
        let rx = events.subscribe();
        (PlaybackEngine::new(backend, events, EngineConfig::default()), rx)
    }

    fn drain(rx: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn states(events: &[CoreEvent]) -> Vec<PlaybackState> {
        events
            .iter()
            .filter_map(|event| match event {
                CoreEvent::Playback(PlaybackEvent::StateChanged { state, .. }) => Some(*state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_play_goes_through_loading_to_playing() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, mut rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();

        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(
            states(&drain(&mut rx)),
            vec![PlaybackState::Loading, PlaybackState::Playing]
        );
        assert!(engine.is_topic_playing("t1"));
        assert!(!engine.is_topic_paused("t1"));

        let handle = backend.last_handle().unwrap();
        assert_eq!(handle.calls(), vec!["set_volume:1", "play"]);
    }

    #[tokio::test]
    async fn test_loading_is_visible_before_load_completes() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, mut rx) = engine_with(backend.clone());
        let gate = backend.gate("https://cdn.test/t1.mp3");

        let task = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.play(&topic("t1")).await })
        };
        backend.wait_for_loads(1).await;

        assert_eq!(engine.state(), PlaybackState::Loading);
        assert_eq!(engine.current_topic().map(|t| t.id), Some("t1".to_string()));
        assert_eq!(states(&drain(&mut rx)), vec![PlaybackState::Loading]);

        gate.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_load_failure_moves_to_error() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_url("https://cdn.test/t1.mp3");
        let (engine, mut rx) = engine_with(backend.clone());

        let err = engine.play(&topic("t1")).await.unwrap_err();

        assert!(matches!(err, PlaybackError::Load { .. }));
        assert!(err.is_retryable());
        assert_eq!(engine.state(), PlaybackState::Error);

        let events = drain(&mut rx);
        assert_eq!(
            states(&events),
            vec![PlaybackState::Loading, PlaybackState::Error]
        );
        assert!(events.iter().any(|event| matches!(
            event,
            CoreEvent::Playback(PlaybackEvent::Error {
                code: ErrorCode::LoadError,
                retryable: true,
                ..
            })
        )));
    }

    #[tokio::test]
    async fn test_native_play_failure_moves_to_error() {
        let backend = Arc::new(FakeBackend::with_options(FakeHandleOptions {
            fail_play: true,
            ..Default::default()
        }));
        let (engine, mut rx) = engine_with(backend.clone());

        let err = engine.play(&topic("t1")).await.unwrap_err();

        assert!(matches!(err, PlaybackError::Play { .. }));
        assert_eq!(engine.state(), PlaybackState::Error);
        assert!(drain(&mut rx).iter().any(|event| matches!(
            event,
            CoreEvent::Playback(PlaybackEvent::Error {
                code: ErrorCode::PlayError,
                retryable: true,
                ..
            })
        )));

        // Stopping from Error releases the loaded handle.
        engine.stop().await;
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(backend.last_handle().unwrap().release_count(), 1);
    }

    #[tokio::test]
    async fn test_pause_and_stop_are_noops_when_idle() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, mut rx) = engine_with(backend.clone());

        engine.pause().await;
        engine.stop().await;
        engine.seek(10.0).await;

        assert_eq!(engine.state(), PlaybackState::Idle);
        assert_eq!(backend.load_count(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_pause_then_resume_does_not_reload() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, _rx) = engine_with(backend.clone());
        let t1 = topic("t1");

        engine.play(&t1).await.unwrap();
        engine.pause().await;
        assert!(engine.is_topic_paused("t1"));

        let before = engine.generation();
        engine.play(&t1).await.unwrap();

        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.generation() > before);
        assert_eq!(backend.load_count(), 1);

        let handle = backend.last_handle().unwrap();
        assert_eq!(handle.call_count("play"), 2);
        assert_eq!(handle.call_count("pause"), 1);
    }

    #[tokio::test]
    async fn test_pause_while_resuming_keeps_paused() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, mut rx) = engine_with(backend.clone());
        let t1 = topic("t1");

        engine.play(&t1).await.unwrap();
        engine.pause().await;
        drain(&mut rx);

        let handle = backend.last_handle().unwrap();
        let gate = handle.gate_play();
        let resuming = {
            let engine = engine.clone();
            let t1 = t1.clone();
            tokio::spawn(async move { engine.play(&t1).await })
        };
        tokio::time::timeout(Duration::from_secs(1), async {
            while handle.call_count("play") < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        engine.pause().await;
        gate.send(()).unwrap();
        resuming.await.unwrap().unwrap();

        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!(engine.is_topic_paused("t1"));
        assert_eq!(handle.call_count("pause"), 2);
        assert!(states(&drain(&mut rx)).is_empty());

        // The deferred pause is spent; a later resume plays normally.
        engine.play(&t1).await.unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_play_same_topic_while_playing_is_noop() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, mut rx) = engine_with(backend.clone());
        let t1 = topic("t1");

        engine.play(&t1).await.unwrap();
        drain(&mut rx);
        engine.play(&t1).await.unwrap();

        assert_eq!(backend.load_count(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_pause_failure_leaves_state() {
        let backend = Arc::new(FakeBackend::with_options(FakeHandleOptions {
            fail_pause: true,
            ..Default::default()
        }));
        let (engine, mut rx) = engine_with(backend);

        engine.play(&topic("t1")).await.unwrap();
        drain(&mut rx);
        engine.pause().await;

        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_stop_rewinds_and_releases_once() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, _rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();
        engine.stop().await;
        engine.stop().await;

        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(engine.current_topic().is_none());
        assert!(!engine.has_handle());

        let handle = backend.last_handle().unwrap();
        let calls = handle.calls();
        assert_eq!(&calls[calls.len() - 3..], ["stop", "seek:0", "release"]);
        assert_eq!(handle.release_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_failure_still_stops() {
        let backend = Arc::new(FakeBackend::with_options(FakeHandleOptions {
            fail_stop: true,
            fail_release: true,
            ..Default::default()
        }));
        let (engine, _rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();
        engine.stop().await;

        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(backend.last_handle().unwrap().release_count(), 1);
    }

    #[tokio::test]
    async fn test_switching_topics_releases_previous_handle() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, _rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();
        engine.play(&topic("t2")).await.unwrap();

        let handles = backend.handles();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].release_count(), 1);
        assert_eq!(handles[1].release_count(), 0);
        assert!(engine.is_topic_playing("t2"));
    }

    #[tokio::test]
    async fn test_late_load_of_superseded_play_is_discarded() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, mut rx) = engine_with(backend.clone());
        let gate = backend.gate("https://cdn.test/t1.mp3");

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.play(&topic("t1")).await })
        };
        backend.wait_for_loads(1).await;

        engine.play(&topic("t2")).await.unwrap();
        assert!(engine.is_topic_playing("t2"));
        let events_before = drain(&mut rx);

        gate.send(()).unwrap();
        let result = first.await.unwrap();

        assert!(matches!(result, Err(PlaybackError::Superseded { .. })));
        assert!(engine.is_topic_playing("t2"));
        assert_eq!(engine.current_topic().map(|t| t.id), Some("t2".to_string()));
        assert!(drain(&mut rx).is_empty());
        assert!(!events_before.is_empty());

        let handles = backend.handles();
        let t1 = handles.iter().find(|h| h.url().ends_with("t1.mp3")).unwrap();
        let t2 = handles.iter().find(|h| h.url().ends_with("t2.mp3")).unwrap();
        assert_eq!(t1.call_count("play"), 0);
        assert_eq!(t1.release_count(), 1);
        assert_eq!(t2.release_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_during_load_supersedes_it() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, _rx) = engine_with(backend.clone());
        let gate = backend.gate("https://cdn.test/t1.mp3");

        let pending = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.play(&topic("t1")).await })
        };
        backend.wait_for_loads(1).await;

        engine.stop().await;
        assert_eq!(engine.state(), PlaybackState::Stopped);

        gate.send(()).unwrap();
        assert!(pending.await.unwrap().unwrap_err().is_superseded());
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(backend.last_handle().unwrap().release_count(), 1);
    }

    #[tokio::test]
    async fn test_seek_clamps_to_duration() {
        let backend = Arc::new(FakeBackend::with_options(FakeHandleOptions {
            duration: Some(200.0),
            ..Default::default()
        }));
        let (engine, mut rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();
        drain(&mut rx);

        engine.seek(500.0).await;
        let handle = backend.last_handle().unwrap();
        assert_eq!(handle.position(), 200.0);

        engine.seek(-5.0).await;
        assert_eq!(handle.position(), 0.0);

        engine.seek(f64::NAN).await;
        assert_eq!(handle.call_count("seek"), 2);

        let updates: Vec<f64> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                CoreEvent::Playback(PlaybackEvent::ProgressUpdated {
                    current_position,
                    duration,
                    ..
                }) => {
                    assert_eq!(duration, 200.0);
                    Some(current_position)
                }
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec![200.0, 0.0]);
    }

    #[tokio::test]
    async fn test_seek_falls_back_to_catalog_duration() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, _rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();
        engine.pause().await;
        engine.seek(1_000.0).await;

        assert_eq!(backend.last_handle().unwrap().position(), 300.0);
    }

    #[tokio::test]
    async fn test_current_position_and_report() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, mut rx) = engine_with(backend.clone());

        assert!(engine.current_position().await.is_none());

        engine.play(&topic("t1")).await.unwrap();
        backend.last_handle().unwrap().set_position(75.0);
        drain(&mut rx);

        let snapshot = engine.report_progress().await.unwrap();
        assert_eq!(snapshot.position, 75.0);
        assert_eq!(snapshot.percentage, 25.0);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [CoreEvent::Playback(PlaybackEvent::ProgressUpdated { .. })]
        ));
    }

    #[tokio::test]
    async fn test_volume_is_clamped_and_reapplied() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, _rx) = engine_with(backend.clone());

        engine.set_volume(0.25).await.unwrap();
        engine.play(&topic("t1")).await.unwrap();
        assert_eq!(backend.last_handle().unwrap().volume(), Some(0.25));

        engine.set_volume(1.7).await.unwrap();
        assert_eq!(engine.volume(), 1.0);
        assert_eq!(backend.last_handle().unwrap().volume(), Some(1.0));

        assert!(matches!(
            engine.set_volume(f32::NAN).await,
            Err(PlaybackError::InvalidVolume(_))
        ));
        assert_eq!(engine.volume(), 1.0);
    }

    #[tokio::test]
    async fn test_natural_end_stops_and_keeps_topic() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, mut rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();
        drain(&mut rx);
        backend.last_handle().unwrap().finish();

        let completed = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match rx.recv().await {
                    Ok(CoreEvent::Playback(PlaybackEvent::Completed { topic_id })) => {
                        return topic_id
                    }
                    Ok(_) => continue,
                    Err(e) => panic!("event bus closed: {e}"),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(completed, "t1");
        tokio::time::timeout(Duration::from_secs(1), async {
            while engine.state() != PlaybackState::Stopped || engine.has_handle() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(engine.current_topic().map(|t| t.id), Some("t1".to_string()));
        assert!(!engine.is_topic_playing("t1"));

        // Already stopped: stop() does nothing more.
        engine.stop().await;
        tokio::task::yield_now().await;
        assert_eq!(backend.last_handle().unwrap().release_count(), 1);
    }

    #[tokio::test]
    async fn test_dropping_engine_frees_end_watcher() {
        let backend = Arc::new(FakeBackend::new());
        let (engine, _rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();
        let handle = backend.last_handle().unwrap();
        assert_eq!(handle.live_references(), 3);

        drop(engine);

        // Only the backend's record and this test's clone remain.
        tokio::time::timeout(Duration::from_secs(1), async {
            while handle.live_references() > 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(handle.release_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_swallows_release_failure() {
        let backend = Arc::new(FakeBackend::with_options(FakeHandleOptions {
            fail_release: true,
            ..Default::default()
        }));
        let (engine, mut rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();
        drain(&mut rx);
        engine.cleanup().await;
        engine.cleanup().await;

        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(engine.current_topic().is_none());
        assert_eq!(backend.last_handle().unwrap().release_count(), 1);
        assert_eq!(states(&drain(&mut rx)), vec![PlaybackState::Idle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_bounds_hanging_release() {
        let backend = Arc::new(FakeBackend::with_options(FakeHandleOptions {
            hang_release: true,
            ..Default::default()
        }));
        let (engine, _rx) = engine_with(backend.clone());

        engine.play(&topic("t1")).await.unwrap();
        engine.cleanup().await;

        assert_eq!(engine.state(), PlaybackState::Idle);
        assert_eq!(backend.last_handle().unwrap().release_count(), 1);
    }
}
