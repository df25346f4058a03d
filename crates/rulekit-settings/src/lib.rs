//! # rulekit-settings
//!
//! Layered configuration for rulekit hosts and the `rulekit` CLI.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RulekitSettings::default()`]
//! 2. **User file**: `~/.rulekit/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `RULEKIT_*` overrides
//!
//! ```no_run
//! use rulekit_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("hook priority: {}", settings.gateway.default_priority);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, load_settings, load_settings_from_path, load_settings_with, settings_path};
pub use types::{GatewaySettings, LogFormat, LoggingSettings, PlaceholderSettings, RulekitSettings};

use std::sync::OnceLock;

static SETTINGS: OnceLock<RulekitSettings> = OnceLock::new();

/// Get the process-wide settings.
///
/// The first call loads `~/.rulekit/settings.json` with env overrides, falling
/// back to compiled defaults if loading fails.
pub fn get_settings() -> &'static RulekitSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Install the process-wide settings.
///
/// Hands the value back if settings were already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: RulekitSettings) -> std::result::Result<(), RulekitSettings> {
    SETTINGS.set(settings)
}
