//! Workspace umbrella crate.
//!
//! Host applications can depend on `listening-workspace` and enable the
//! `desktop-shims` feature to pull in the `core-service` façade together with
//! the SQLite-backed settings store from `bridge-desktop`.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
