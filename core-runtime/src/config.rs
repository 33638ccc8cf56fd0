//! # Core Configuration Module
//!
//! Provides configuration management for the listening core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the bridges the core depends on. It enforces fail-fast
//! validation so a missing capability is reported at startup rather than on
//! the first `play()`.
//!
//! ## Required Dependencies
//!
//! - `AudioBackend` - Native single-track playback
//! - `SettingsStore` - Durable key-value storage for listening progress
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - Time source for `lastPlayed` stamps (default: `SystemClock`)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .audio_backend(Arc::new(MyNativeBackend::new()))
//!     .settings_store(Arc::new(SqliteSettingsStore::new(path).await?))
//!     .event_buffer_size(256)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Panics with an actionable message: no AudioBackend was supplied
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing required bridges");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use bridge_traits::{AudioBackend, Clock, SettingsStore, SystemClock};
use std::sync::Arc;

/// Core configuration for the listening core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Native playback backend (required)
    pub audio_backend: Arc<dyn AudioBackend>,

    /// Progress persistence (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Per-subscriber event buffer
    pub event_buffer_size: usize,

    /// Logging setup applied by the service bootstrap
    pub logging: Option<LoggingConfig>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("audio_backend", &"AudioBackend { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("clock", &"Clock { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .field("logging", &self.logging)
            .finish()
    }
}

impl CoreConfig {
    /// Start building a configuration.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    audio_backend: Option<Arc<dyn AudioBackend>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    pub fn audio_backend(mut self, backend: Arc<dyn AudioBackend>) -> Self {
        self.audio_backend = Some(backend);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required bridge was not supplied
    /// - [`Error::Config`] when a value is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let audio_backend = self.audio_backend.ok_or_else(|| Error::CapabilityMissing {
            capability: "AudioBackend".to_string(),
            message: "No native audio backend provided. \
                      Inject the host platform's player adapter."
                .to_string(),
        })?;

        let settings_store = self.settings_store.ok_or_else(|| Error::CapabilityMissing {
            capability: "SettingsStore".to_string(),
            message: "No settings store provided. \
                      Desktop: use bridge_desktop::SqliteSettingsStore. \
                      Mobile: inject platform-native preferences adapter."
                .to_string(),
        })?;

        let event_buffer_size = self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        if event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be greater than zero".to_string(),
            ));
        }

        Ok(CoreConfig {
            audio_backend,
            settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size,
            logging: self.logging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{error::Result as BridgeResult, AudioHandle};

    struct NullBackend;

    #[async_trait]
    impl AudioBackend for NullBackend {
        async fn load(&self, _url: &str) -> BridgeResult<Box<dyn AudioHandle>> {
            Err(bridge_traits::BridgeError::NotAvailable("null".to_string()))
        }
    }

    struct NullStore;

    #[async_trait]
    impl SettingsStore for NullStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn set_bool(&self, _key: &str, _value: bool) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_bool(&self, _key: &str) -> BridgeResult<Option<bool>> {
            Ok(None)
        }
        async fn set_i64(&self, _key: &str, _value: i64) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_i64(&self, _key: &str) -> BridgeResult<Option<i64>> {
            Ok(None)
        }
        async fn set_f64(&self, _key: &str, _value: f64) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_f64(&self, _key: &str) -> BridgeResult<Option<f64>> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn has_key(&self, _key: &str) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_audio_backend() {
        let err = CoreConfig::builder()
            .settings_store(Arc::new(NullStore))
            .build()
            .unwrap_err();

        match err {
            Error::CapabilityMissing { capability, .. } => assert_eq!(capability, "AudioBackend"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_settings_store() {
        let err = CoreConfig::builder()
            .audio_backend(Arc::new(NullBackend))
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            Error::CapabilityMissing { ref capability, .. } if capability == "SettingsStore"
        ));
    }

    #[test]
    fn test_defaults_applied() {
        let config = CoreConfig::builder()
            .audio_backend(Arc::new(NullBackend))
            .settings_store(Arc::new(NullStore))
            .build()
            .unwrap();

        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.logging.is_none());
        assert!(config.clock.unix_timestamp() > 0);
        assert!(format!("{:?}", config).contains("event_buffer_size"));
    }

    #[test]
    fn test_zero_event_buffer_rejected() {
        let result = CoreConfig::builder()
            .audio_backend(Arc::new(NullBackend))
            .settings_store(Arc::new(NullStore))
            .event_buffer_size(0)
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
