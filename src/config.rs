//! Configuration file parser for the service's config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`,
//! which runs against the in-process memory store. Unknown keys are silently
//! ignored by serde (with `deny_unknown_fields` off), though we log a warning
//! when the file contains potential typos.
use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::ratelimit::RateLimitSettings;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level service configuration.
///
/// All sections use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
    pub feeds: FeedDefaults,
}

/// Which key-value backend serves the registry, ledger, and limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store; data does not survive a restart.
    #[default]
    Memory,
    Redis,
}

/// Backend selection and connection details.
///
/// The connection URL is held as a [`SecretString`] because Redis URLs may
/// embed credentials; its `Debug` output is redacted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Connection URL, e.g. `redis://:password@localhost:6379/0`.
    url: SecretString,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: SecretString::from("redis://127.0.0.1:6379"),
        }
    }
}

impl StoreConfig {
    pub fn url(&self) -> &str {
        self.url.expose_secret()
    }
}

/// Limiter tunables, durations expressed in whole seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub mirror_max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let settings = RateLimitSettings::default();
        Self {
            max_requests: settings.max_requests,
            window_seconds: settings.window.as_secs(),
            sweep_interval_seconds: settings.sweep_interval.as_secs(),
            mirror_max_entries: settings.mirror_max_entries,
        }
    }
}

impl RateLimitConfig {
    pub fn settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            max_requests: self.max_requests,
            window: Duration::from_secs(self.window_seconds),
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
            mirror_max_entries: self.mirror_max_entries,
        }
    }
}

/// Defaults applied to feeds registered without explicit values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedDefaults {
    pub max_items: usize,
    pub language: String,
}

impl Default for FeedDefaults {
    fn default() -> Self {
        Self {
            max_items: crate::feed::DEFAULT_MAX_ITEMS,
            language: crate::feed::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to bound memory use on a corrupted
        // or runaway config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {} // Size is within limits, proceed
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["store", "rate_limit", "feeds"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            backend = ?config.store.backend,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
