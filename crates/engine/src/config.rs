//! Unit of work configuration via `batchwork.toml`
//!
//! A unit of work runs with defaults unless a config is supplied. Services
//! that want to tune behaviour keep a `batchwork.toml` next to their other
//! settings and load it once at startup.

use crate::error::{Result, UnitOfWorkError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "batchwork.toml";

/// Unit of work configuration loaded from `batchwork.toml`.
///
/// # Example
///
/// ```toml
/// # Walk the undo log when a write fails during complete (default: true)
/// compensate_on_failure = true
///
/// # Refuse registrations once this many actions are queued
/// # max_pending_actions = 1000
///
/// label = "checkout"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWorkConfig {
    /// Attempt compensation of applied writes when a later write fails.
    #[serde(default = "default_compensate_on_failure")]
    pub compensate_on_failure: bool,
    /// Maximum number of queued actions accepted by `register_*`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pending_actions: Option<usize>,
    /// Name carried into log events and error messages.
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_compensate_on_failure() -> bool {
    true
}

fn default_label() -> String {
    "unit-of-work".to_string()
}

impl Default for UnitOfWorkConfig {
    fn default() -> Self {
        Self {
            compensate_on_failure: default_compensate_on_failure(),
            max_pending_actions: None,
            label: default_label(),
        }
    }
}

impl UnitOfWorkConfig {
    /// Default config with a different label
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Check values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero pending-action limit or an empty label.
    pub fn validate(&self) -> Result<()> {
        if self.max_pending_actions == Some(0) {
            return Err(UnitOfWorkError::Config(
                "max_pending_actions must be at least 1".to_string(),
            ));
        }
        if self.label.trim().is_empty() {
            return Err(UnitOfWorkError::Config("label must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Batchwork unit of work configuration
#
# Walk the undo log when a store write fails during complete (default: true).
# Compensation is best effort: failures are reported, never retried.
compensate_on_failure = true

# Refuse registrations once this many actions are queued (default: unlimited).
# Edits to tracked entities are never refused.
# max_pending_actions = 1000

# Name used in log events and error messages.
label = "unit-of-work"
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: UnitOfWorkConfig = toml::from_str(content)
            .map_err(|e| UnitOfWorkError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UnitOfWorkError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            UnitOfWorkError::Config(msg) => {
                UnitOfWorkError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                UnitOfWorkError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| UnitOfWorkError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            UnitOfWorkError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
