//! # Playback Module
//!
//! Single-track playback state machine over a host-provided native player.
//!
//! ## Overview
//!
//! This module handles:
//! - Owning at most one native [`AudioHandle`](bridge_traits::AudioHandle)
//!   and releasing it exactly once
//! - The `Idle/Loading/Playing/Paused/Stopped/Error` state machine
//! - Discarding results of async work that a newer command superseded
//! - Publishing state, progress, error and completion events on the
//!   [`EventBus`](core_runtime::events::EventBus)
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{EngineConfig, PlaybackEngine, Topic};
//! use core_runtime::events::EventBus;
//!
//! let engine = PlaybackEngine::new(backend, EventBus::default(), EngineConfig::default());
//! let topic = Topic::new("topic-1", "Morning Focus", "https://cdn.example.com/t1.mp3", 300.0);
//!
//! engine.play(&topic).await?;
//! engine.seek(42.0).await;
//! engine.pause().await;
//! engine.cleanup().await;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod topic;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::EngineConfig;
pub use engine::PlaybackEngine;
pub use error::{PlaybackError, Result};
pub use session::{PositionSnapshot, SessionId};
pub use topic::Topic;
