//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RulekitSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `RULEKIT_*` environment variable overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use rulekit_core::deep_merge;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{LOG_LEVELS, LogFormat, RulekitSettings};

/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "RULEKIT_LOG_LEVEL";
/// Environment variable overriding `logging.format`.
pub const ENV_LOG_FORMAT: &str = "RULEKIT_LOG_FORMAT";
/// Environment variable overriding `gateway.defaultPriority`.
pub const ENV_DEFAULT_PRIORITY: &str = "RULEKIT_DEFAULT_PRIORITY";
/// Environment variable overriding `gateway.hookCategory`.
pub const ENV_HOOK_CATEGORY: &str = "RULEKIT_HOOK_CATEGORY";

const PRIORITY_RANGE: (i32, i32) = (-100_000, 100_000);

/// Resolve the path to the settings file (`~/.rulekit/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rulekit").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RulekitSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid final value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<RulekitSettings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Load settings reading overrides through `env` instead of the process
/// environment.
pub fn load_settings_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<RulekitSettings> {
    let defaults = serde_json::to_value(RulekitSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RulekitSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut RulekitSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `env`.
///
/// Values are parsed strictly; an invalid value is logged and ignored so the
/// file/default value stays in effect.
pub fn apply_overrides(settings: &mut RulekitSettings, env: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    if let Some(raw) = read(ENV_LOG_LEVEL) {
        match parse_log_level(&raw) {
            Some(level) => settings.logging.level = level,
            None => warn!(var = ENV_LOG_LEVEL, value = %raw, "invalid log level env var, ignoring"),
        }
    }
    if let Some(raw) = read(ENV_LOG_FORMAT) {
        match parse_log_format(&raw) {
            Some(format) => settings.logging.format = format,
            None => warn!(var = ENV_LOG_FORMAT, value = %raw, "invalid log format env var, ignoring"),
        }
    }
    if let Some(raw) = read(ENV_DEFAULT_PRIORITY) {
        match parse_i32_range(&raw, PRIORITY_RANGE.0, PRIORITY_RANGE.1) {
            Some(priority) => settings.gateway.default_priority = priority,
            None => warn!(var = ENV_DEFAULT_PRIORITY, value = %raw, "invalid priority env var, ignoring"),
        }
    }
    if let Some(raw) = read(ENV_HOOK_CATEGORY) {
        settings.gateway.hook_category = raw.trim().to_string();
    }
}

/// Parse a log level name, case-insensitively.
pub fn parse_log_level(val: &str) -> Option<String> {
    let level = val.trim().to_ascii_lowercase();
    LOG_LEVELS.contains(&level.as_str()).then_some(level)
}

/// Parse a log format name (`compact` or `json`).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.trim().to_ascii_lowercase().as_str() {
        "compact" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

/// Parse an integer within `[min, max]`.
pub fn parse_i32_range(val: &str, min: i32, max: i32) -> Option<i32> {
    val.trim().parse::<i32>().ok().filter(|v| (min..=max).contains(v))
}
