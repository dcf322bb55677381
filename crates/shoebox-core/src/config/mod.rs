//! Configuration management for Shoebox.
//!
//! This module handles loading, saving, and validating Shoebox configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/shoebox/config.toml` |
//! | macOS | `~/Library/Application Support/com.shoebox.Shoebox/config.toml` |
//! | Windows | `%APPDATA%\Shoebox\Shoebox\config\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use shoebox_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Chunk size: {}", config.upload.chunk_size);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Smallest chunk size the resumable protocol handles well (256 KiB).
const MIN_CHUNK_SIZE: usize = 256 * 1024;

/// Main configuration struct for Shoebox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote service settings
    pub remote: RemoteConfig,
    /// Upload settings
    pub upload: UploadConfig,
    /// Session record settings
    pub sessions: SessionConfig,
}

/// Remote service configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// API base URL; uploads go to `{api_base}/uploads`
    pub api_base: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: crate::DEFAULT_API_BASE.to_string(),
        }
    }
}

impl RemoteConfig {
    /// Resumable-upload endpoint derived from the API base.
    #[must_use]
    pub fn upload_endpoint(&self) -> String {
        format!("{}/uploads", self.api_base.trim_end_matches('/'))
    }

    /// Media-item creation endpoint derived from the API base.
    #[must_use]
    pub fn batch_create_endpoint(&self) -> String {
        format!("{}/mediaItems:batchCreate", self.api_base.trim_end_matches('/'))
    }
}

/// Upload configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Bytes sent per chunk request
    pub chunk_size: usize,
    /// Deadline for a single chunk request
    #[serde(with = "humantime_serde")]
    pub chunk_timeout: Duration,
    /// Smallest accepted file
    pub min_file_size: u64,
    /// Largest accepted file
    pub max_file_size: u64,
    /// Create a media item after each upload
    pub register: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            chunk_timeout: Duration::from_secs(crate::DEFAULT_CHUNK_TIMEOUT_SECS),
            min_file_size: crate::MIN_FILE_SIZE,
            max_file_size: crate::MAX_FILE_SIZE,
            register: true,
        }
    }
}

/// Session record configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Override for the session record directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Records untouched for longer than this are pruned
    #[serde(with = "humantime_serde")]
    pub expire: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: None,
            expire: Duration::from_secs(crate::DEFAULT_SESSION_EXPIRY_SECS),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(&path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check values that would make uploads misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.upload.chunk_size < MIN_CHUNK_SIZE {
            return Err(Error::InvalidConfig {
                key: "upload.chunk_size".to_string(),
                reason: format!("must be at least {MIN_CHUNK_SIZE} bytes"),
            });
        }
        if self.upload.chunk_timeout.is_zero() {
            return Err(Error::InvalidConfig {
                key: "upload.chunk_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.upload.min_file_size == 0 || self.upload.min_file_size > self.upload.max_file_size
        {
            return Err(Error::InvalidConfig {
                key: "upload.min_file_size".to_string(),
                reason: "must be non-zero and not above upload.max_file_size".to_string(),
            });
        }
        if !self.remote.api_base.starts_with("http://")
            && !self.remote.api_base.starts_with("https://")
        {
            return Err(Error::InvalidConfig {
                key: "remote.api_base".to_string(),
                reason: "must be an http(s) URL".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "shoebox", "Shoebox")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();
        let (digits, unit_secs) = match s.char_indices().last() {
            Some((i, 's')) => (&s[..i], 1),
            Some((i, 'm')) => (&s[..i], 60),
            Some((i, 'h')) => (&s[..i], 60 * 60),
            Some((i, 'd')) => (&s[..i], 24 * 60 * 60),
            _ => return Err(serde::de::Error::custom("invalid duration format")),
        };
        let n = digits.parse::<u64>().map_err(serde::de::Error::custom)?;
        n.checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| serde::de::Error::custom("duration out of range"))
    }
}
