//! # Progress Module
//!
//! Persists per-topic listening progress and follows the playback engine.
//!
//! ## Overview
//!
//! This module handles:
//! - [`ProgressRecord`] JSON records in the host [`SettingsStore`](bridge_traits::SettingsStore)
//! - Schema migration and repair of unusable records at launch
//! - Throttled position saves and one-shot completion while a topic plays
//! - The resume prompt decision
//!
//! ## Usage
//!
//! ```ignore
//! use core_progress::{ProgressConfig, ProgressStore, ProgressTracker, ResumePolicy};
//!
//! let store = Arc::new(ProgressStore::new(settings, clock));
//! store.initialize().await?;
//!
//! let tracker = ProgressTracker::new(store.clone(), Arc::new(engine.clone()), events, ProgressConfig::default());
//! let listener = tracker.attach();
//!
//! let resume = ResumePolicy::new(store, tracker.config());
//! if resume.should_show_resume_dialog("topic-1").await {
//!     // ask the user
//! }
//! ```

pub mod config;
pub mod error;
pub mod record;
pub mod resume;
pub mod store;
pub mod tracker;

pub use config::ProgressConfig;
pub use error::{ProgressError, Result};
pub use record::{ParsedRecord, ProgressRecord};
pub use resume::{ResumeDecision, ResumePolicy};
pub use store::{MigrationReport, ProgressStore, CURRENT_SCHEMA_VERSION};
pub use tracker::{PositionSource, ProgressTracker};
