//! Conversion configuration loaded from TOML.
//!
//! The format flags describe how the acquisition software wrote the file, so
//! they are usually fixed per setup and kept in a config file:
//!
//! ```toml
//! [format]
//! calibrated = false
//! write_waveform = true
//! ```

use crate::types::FormatFlags;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub format: FormatConfig,
}

/// `[format]` table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatConfig {
    /// Records carry a calibrated energy after the charge
    #[serde(default)]
    pub calibrated: bool,
    /// Keep waveform samples in the output
    #[serde(default)]
    pub write_waveform: bool,
}

impl From<FormatConfig> for FormatFlags {
    fn from(config: FormatConfig) -> Self {
        FormatFlags::new(config.calibrated, config.write_waveform)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Format flags described by this configuration.
    pub fn format_flags(&self) -> FormatFlags {
        self.format.into()
    }
}
