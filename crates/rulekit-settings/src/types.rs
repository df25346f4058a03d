//! Settings types.
//!
//! Every struct uses `#[serde(rename_all = "camelCase", default)]` so a
//! settings file only needs the keys it changes.

use rulekit_core::PlaceholderResolver;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Log levels accepted by `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RulekitSettings {
    /// Log output.
    pub logging: LoggingSettings,
    /// Placeholder resolution.
    pub placeholders: PlaceholderSettings,
    /// Host event binding.
    pub gateway: GatewaySettings,
}

impl RulekitSettings {
    /// Reject values deserialization alone cannot rule out.
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(SettingsError::InvalidValue(format!(
                "logging.level must be one of {}, got {:?}",
                LOG_LEVELS.join("/"),
                self.logging.level
            )));
        }
        if self.gateway.hook_category.trim().is_empty() {
            return Err(SettingsError::InvalidValue("gateway.hookCategory must not be empty".into()));
        }
        if self
            .placeholders
            .case_insensitive_categories
            .iter()
            .any(|c| c.trim().is_empty())
        {
            return Err(SettingsError::InvalidValue(
                "placeholders.caseInsensitiveCategories must not contain empty names".into(),
            ));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Placeholder settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaceholderSettings {
    /// Categories whose keys resolve case-insensitively in `{category:key}`.
    pub case_insensitive_categories: Vec<String>,
}

impl Default for PlaceholderSettings {
    fn default() -> Self {
        Self {
            case_insensitive_categories: vec!["header".to_string()],
        }
    }
}

impl PlaceholderSettings {
    /// Register the configured categories on a resolver.
    pub fn install(&self, resolver: &mut PlaceholderResolver) {
        for category in &self.case_insensitive_categories {
            resolver.register_case_insensitive(category.clone());
        }
    }
}

/// Host event binding settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Priority used when a rule's metadata has no `event_priority`.
    pub default_priority: i32,
    /// Context category carrying the fired event's name and arguments.
    pub hook_category: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            default_priority: 10,
            hook_category: "hook".to_string(),
        }
    }
}
