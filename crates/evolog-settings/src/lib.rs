//! # evolog-settings
//!
//! Layered configuration for the evolog datastore tools.
//!
//! Loading flow: compiled defaults → optional JSON settings file
//! (deep-merged) → environment variable overrides. Invalid env values are
//! ignored with a warning rather than failing startup.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{DatabaseSettings, EvologSettings, LoggingSettings};
