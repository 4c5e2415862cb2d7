//! Configuration loading and validation.
//!
//! Channel instances are described in a JSON5 file.
//! Config location: `~/.switchboard/switchboard.json`

mod settings;

pub use settings::{ChannelSettings, DEFAULT_TIMEOUT, STRICT_WEBHOOKS, TIMEOUT_SECS};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::ChannelType;
use crate::validation::limits;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Field present but unusable.
    #[error("Invalid field {key}: {reason}")]
    InvalidField {
        /// Offending key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Channel instances by channel ID.
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,

    /// Webhook endpoint settings.
    #[serde(default)]
    pub webhooks: WebhookConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let size = std::fs::metadata(path)?.len();
        if size > limits::MAX_CONFIG_FILE_SIZE as u64 {
            return Err(ConfigError::Validation(format!(
                "config file is {size} bytes, limit is {}",
                limits::MAX_CONFIG_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("switchboard.json")
    }

    /// Get the state directory.
    ///
    /// Uses `SWITCHBOARD_STATE_DIR` env var if set, otherwise `~/.switchboard`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("SWITCHBOARD_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".switchboard")
        } else {
            PathBuf::from(".switchboard")
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for id in self.channels.keys() {
            if id.trim().is_empty() {
                return Err(ConfigError::Validation("channel ID cannot be empty".to_string()));
            }
            if id.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "channel ID '{id}' cannot contain '/'"
                )));
            }
        }

        let prefix = &self.webhooks.path_prefix;
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(ConfigError::Validation(format!(
                "webhook path prefix '{prefix}' must start with '/' and not end with one"
            )));
        }

        if self.webhooks.max_body_bytes == 0 {
            return Err(ConfigError::Validation(
                "webhook body limit cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Enabled channels in ID order.
    pub fn enabled_channels(&self) -> impl Iterator<Item = (&str, &ChannelConfig)> {
        self.channels
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(id, c)| (id.as_str(), c))
    }
}

/// One configured channel instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Channel type.
    #[serde(rename = "type")]
    pub channel_type: ChannelType,

    /// Whether the channel is started.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-channel override of the global strict-webhook setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_webhooks: Option<bool>,

    /// Provider-specific settings handed to `initialize`.
    #[serde(default)]
    pub settings: ChannelSettings,
}

impl ChannelConfig {
    /// Settings with the strict-webhook decision applied.
    ///
    /// An explicit `strict_webhooks` key in the settings map wins, then the
    /// per-channel override, then the global default.
    #[must_use]
    pub fn effective_settings(&self, global_strict: bool) -> ChannelSettings {
        let mut settings = self.settings.clone();
        if !settings.contains(STRICT_WEBHOOKS) {
            let strict = self.strict_webhooks.unwrap_or(global_strict);
            settings.insert(STRICT_WEBHOOKS, strict.to_string());
        }
        settings
    }
}

/// Webhook endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Reject webhooks for channels without a configured secret.
    #[serde(default)]
    pub strict: bool,

    /// Prefix prepended to every adapter webhook path (e.g. `/api/v1`).
    #[serde(default)]
    pub path_prefix: String,

    /// Largest webhook body accepted by the router.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            strict: false,
            path_prefix: String::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_body_bytes() -> usize {
    limits::MAX_WEBHOOK_BODY
}
