//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `SettingsStore` held in memory, for hosts that opt out of persistence
//!
//! Native audio output is deliberately not provided here: hosts inject their
//! own `AudioBackend`.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_database_path, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SqliteSettingsStore::new(default_database_path()).await.unwrap();
//!     // Hand `Arc::new(store)` to the core configuration
//! }
//! ```

mod memory;
mod settings;

pub use memory::InMemorySettingsStore;
pub use settings::SqliteSettingsStore;

use std::path::PathBuf;

/// Application directory name under the platform data dir.
pub const APP_DIR_NAME: &str = "listening-core";

/// Default location of the settings database.
///
/// Falls back to the working directory when the platform exposes no data
/// directory (e.g. a bare container).
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("settings.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_database_path_shape() {
        let path = default_database_path();
        assert!(path.ends_with("listening-core/settings.db"));
    }
}
