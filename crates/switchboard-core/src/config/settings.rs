//! Flat per-channel settings map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::ConfigError;
use crate::secrets::ApiKey;

/// Setting that turns a missing webhook secret into a rejection.
pub const STRICT_WEBHOOKS: &str = "strict_webhooks";

/// Setting overriding the provider HTTP timeout, in seconds.
pub const TIMEOUT_SECS: &str = "timeout_secs";

/// Default provider HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// String-keyed settings handed to an adapter's `initialize`.
///
/// Every channel type reads its own keys out of the same flat map, so the
/// adapter contract stays uniform across very different credential shapes.
/// Empty values count as absent.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSettings(BTreeMap<String, String>);

impl ChannelSettings {
    /// Create empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Whether a non-empty value is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get a trimmed, non-empty value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Get an optional value as an owned string.
    #[must_use]
    pub fn optional(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    /// Get a required value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` naming the key if it is absent.
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingField(key.to_string()))
    }

    /// Get a required secret.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` naming the key if it is absent.
    pub fn secret(&self, key: &str) -> Result<ApiKey, ConfigError> {
        self.require(key).map(|v| ApiKey::new(v.to_string()))
    }

    /// Get an optional secret.
    #[must_use]
    pub fn optional_secret(&self, key: &str) -> Option<ApiKey> {
        self.get(key).map(|v| ApiKey::new(v.to_string()))
    }

    /// Read a boolean flag. Missing means `false`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidField` for values other than
    /// `true/false/1/0/yes/no/on/off`.
    pub fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(false);
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidField {
                key: key.to_string(),
                reason: format!("expected a boolean, got '{value}'"),
            }),
        }
    }

    /// Read a duration given in whole seconds, falling back to `default`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidField` if the value is not a positive integer.
    pub fn duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        match value.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidField {
                key: key.to_string(),
                reason: format!("expected a positive number of seconds, got '{value}'"),
            }),
        }
    }

    /// Provider HTTP timeout (`timeout_secs`, default 30s).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidField` if the value is malformed.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        self.duration_secs(TIMEOUT_SECS, DEFAULT_TIMEOUT)
    }

    /// Whether strict webhook verification is on (`strict_webhooks`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidField` if the value is malformed.
    pub fn strict_webhooks(&self) -> Result<bool, ConfigError> {
        self.flag(STRICT_WEBHOOKS)
    }

    /// Keys present in the map.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ChannelSettings {
    // Values are credentials; only keys are printed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ChannelSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
