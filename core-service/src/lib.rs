//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (native audio,
//! settings storage, clock) into the listening core. It is constructed once
//! at startup and handed to whatever needs it; there is no global registry.
//! Desktop apps typically enable the `desktop-shims` feature (which depends
//! on `bridge-desktop`) and call [`bootstrap_desktop`].
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .audio_backend(backend)
//!     .settings_store(settings)
//!     .build()?;
//! let service = ListeningService::bootstrap(config, ServiceSettings::default()).await?;
//!
//! if service.should_show_resume_dialog(&topic.id).await {
//!     service.play_from_saved(&topic).await?;
//! } else {
//!     service.play(&topic).await?;
//! }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use core_playback::{EngineConfig, PlaybackEngine, PositionSnapshot, Topic};
use core_progress::{
    MigrationReport, ProgressConfig, ProgressRecord, ProgressStore, ProgressTracker,
    ResumeDecision, ResumePolicy,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackState, ProgressEvent};
use core_runtime::logging::init_logging;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
use bridge_traits::AudioBackend;

/// Tunables for the engine and the tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

struct ServiceInner {
    engine: PlaybackEngine,
    store: Arc<ProgressStore>,
    tracker: ProgressTracker,
    resume: ResumePolicy,
    events: EventBus,
    listener: Mutex<Option<JoinHandle<()>>>,
    migration: MigrationReport,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct ListeningService {
    inner: Arc<ServiceInner>,
}

impl ListeningService {
    /// Validate settings, migrate stored progress, and start following
    /// playback.
    pub async fn bootstrap(config: CoreConfig, settings: ServiceSettings) -> Result<Self> {
        settings.engine.validate()?;
        settings.progress.validate()?;

        if let Some(logging) = config.logging.clone() {
            if let Err(e) = init_logging(logging) {
                warn!(error = %e, "Logging was not initialized by the core");
            }
        }

        let events = EventBus::new(config.event_buffer_size);
        let engine = PlaybackEngine::new(
            Arc::clone(&config.audio_backend),
            events.clone(),
            settings.engine,
        );

        let store = Arc::new(ProgressStore::new(
            Arc::clone(&config.settings_store),
            Arc::clone(&config.clock),
        ));
        let migration = store.initialize().await?;

        let tracker = ProgressTracker::new(
            Arc::clone(&store),
            Arc::new(engine.clone()),
            events.clone(),
            settings.progress,
        );
        let listener = tracker.attach();
        let resume = ResumePolicy::new(Arc::clone(&store), tracker.config());

        info!(
            schema_from = migration.from_version,
            schema_to = migration.to_version,
            repaired = migration.repaired_topics.len(),
            "Listening service ready"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                engine,
                store,
                tracker,
                resume,
                events,
                listener: Mutex::new(Some(listener)),
                migration,
            }),
        })
    }

    // ========================================================================
    // Playback control
    // ========================================================================

    pub async fn play(&self, topic: &Topic) -> Result<()> {
        Ok(self.inner.engine.play(topic).await?)
    }

    /// Play `topic` and, when there is saved progress worth resuming, jump
    /// to it. Returns the position playback starts from.
    ///
    /// A paused session for the same topic is resumed where it is.
    pub async fn play_from_saved(&self, topic: &Topic) -> Result<f64> {
        let engine = &self.inner.engine;
        if engine.is_topic_paused(&topic.id) || engine.is_topic_playing(&topic.id) {
            engine.play(topic).await?;
            return Ok(engine
                .current_position()
                .await
                .map_or(0.0, |snapshot| snapshot.position));
        }

        let decision = self.inner.resume.decide(&topic.id).await;
        engine.play(topic).await?;

        match decision {
            ResumeDecision::Prompt { position } => {
                engine.seek(position).await;
                Ok(position)
            }
            ResumeDecision::StartFresh => Ok(0.0),
        }
    }

    /// Play `topic` from the beginning, ignoring saved progress.
    pub async fn restart(&self, topic: &Topic) -> Result<()> {
        self.inner.engine.play(topic).await?;
        self.inner.engine.seek(0.0).await;
        Ok(())
    }

    pub async fn pause(&self) {
        self.inner.engine.pause().await;
    }

    pub async fn stop(&self) {
        self.inner.engine.stop().await;
    }

    pub async fn seek(&self, position: f64) {
        self.inner.engine.seek(position).await;
    }

    pub async fn set_volume(&self, level: f32) -> Result<()> {
        Ok(self.inner.engine.set_volume(level).await?)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> PlaybackState {
        self.inner.engine.state()
    }

    pub fn current_topic(&self) -> Option<Topic> {
        self.inner.engine.current_topic()
    }

    pub fn is_topic_playing(&self, topic_id: &str) -> bool {
        self.inner.engine.is_topic_playing(topic_id)
    }

    pub fn is_topic_paused(&self, topic_id: &str) -> bool {
        self.inner.engine.is_topic_paused(topic_id)
    }

    pub async fn current_position(&self) -> Option<PositionSnapshot> {
        self.inner.engine.current_position().await
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.inner.events.subscribe())
    }

    /// What launch-time migration did.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.inner.migration
    }

    // ========================================================================
    // Progress
    // ========================================================================

    pub async fn should_show_resume_dialog(&self, topic_id: &str) -> bool {
        self.inner.resume.should_show_resume_dialog(topic_id).await
    }

    pub async fn get_resume_position(&self, topic_id: &str) -> f64 {
        self.inner.resume.get_resume_position(topic_id).await
    }

    pub async fn progress(&self, topic_id: &str) -> Result<Option<ProgressRecord>> {
        Ok(self.inner.store.get_record(topic_id).await?)
    }

    pub async fn all_progress(&self) -> Result<Vec<ProgressRecord>> {
        Ok(self.inner.store.get_all_progress_data().await?)
    }

    pub async fn completed_topics(&self) -> Result<Vec<String>> {
        Ok(self.inner.store.completed_topics().await?)
    }

    pub async fn clear_progress(&self, topic_id: &str) -> Result<()> {
        self.inner.store.clear_progress(topic_id).await?;
        let _ = self
            .inner
            .events
            .emit(CoreEvent::Progress(ProgressEvent::Cleared {
                topic_id: Some(topic_id.to_string()),
            }));
        Ok(())
    }

    pub async fn clear_all_progress(&self) -> Result<()> {
        self.inner.store.clear_all().await?;
        let _ = self
            .inner
            .events
            .emit(CoreEvent::Progress(ProgressEvent::Cleared { topic_id: None }));
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Detach from the bus, stop tracking, and release the native handle.
    /// Never fails.
    pub async fn shutdown(&self) {
        let listener = self.inner.listener.lock().take();
        if let Some(listener) = listener {
            listener.abort();
        }
        self.inner.tracker.stop_tracking().await;
        self.inner.engine.cleanup().await;
        info!("Listening service shut down");
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.inner.engine
    }

    pub fn store(&self) -> Arc<ProgressStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.inner.tracker
    }
}

impl std::fmt::Debug for ListeningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListeningService")
            .field("engine", &self.inner.engine)
            .field("tracker", &self.inner.tracker)
            .finish_non_exhaustive()
    }
}

/// Convenience bootstrapper for desktop hosts: settings live in SQLite under
/// the platform data directory.
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub async fn bootstrap_desktop(
    audio_backend: Arc<dyn AudioBackend>,
    settings: ServiceSettings,
) -> Result<ListeningService> {
    let path = bridge_desktop::default_database_path();
    let store = bridge_desktop::SqliteSettingsStore::new(path.clone())
        .await
        .map_err(|e| {
            CoreError::InitializationFailed(format!(
                "settings database at {}: {}",
                path.display(),
                e
            ))
        })?;

    let config = CoreConfig::builder()
        .audio_backend(audio_backend)
        .settings_store(Arc::new(store))
        .build()?;

    ListeningService::bootstrap(config, settings).await
}
