//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the listening core and
//! platform-specific implementations. Each trait represents a capability that
//! the core requires but that must be implemented differently per platform.
//!
//! ## Traits
//!
//! ### Audio
//! - [`AudioBackend`](playback::AudioBackend) - Loads a URL into a native single-track player
//! - [`AudioHandle`](playback::AudioHandle) - Controls one loaded track (play/pause/stop/seek/release)
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Key-value persistence used for listening progress
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let backend = builder.audio_backend
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "AudioBackend".to_string(),
//!         message: "No native audio backend provided.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it with actionable messages.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so handles can be shared across
//! async tasks.

pub mod error;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use playback::{AudioBackend, AudioHandle};
pub use storage::SettingsStore;
pub use time::{Clock, FixedClock, SystemClock};
