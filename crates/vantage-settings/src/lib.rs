//! # vantage-settings
//!
//! Settings for the Vantage clients, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`VantageSettings::default()`]
//! 2. **User file**: `~/.vantage/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `VANTAGE_*` overrides (highest priority)
//!
//! Settings are loaded explicitly and passed to the clients; there is no
//! process-wide instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{LoggingSettings, VantageSettings};
