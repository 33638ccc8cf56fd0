//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the listening core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities every other core crate depends
//! on. It establishes the logging conventions and the event broadcasting
//! mechanism through which the playback engine talks to the progress tracker
//! and the UI.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
