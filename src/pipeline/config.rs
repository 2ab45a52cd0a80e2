//! Configuration file loading for ensemble runs.
//!
//! Run configurations can be stored as TOML or JSON; the format is picked
//! from the file extension.

use std::path::Path;

use crate::core::SegError;
use crate::core::config::{ConfigError, ConfigValidatorExt, EnsembleConfig};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Loads and saves [`EnsembleConfig`] files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a configuration from a file, auto-detecting the format from the extension.
    ///
    /// The loaded configuration is validated before it is returned.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use seg_ensemble::pipeline::ConfigLoader;
    /// use std::path::Path;
    ///
    /// let config = ConfigLoader::load_from_file(Path::new("ensemble.toml"))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_from_file(path: &Path) -> Result<EnsembleConfig, SegError> {
        let format = ConfigFormat::from_extension(path).ok_or_else(|| {
            invalid(format!("Unsupported config file extension: {:?}", path.extension()))
        })?;

        let content = std::fs::read_to_string(path).map_err(|e| {
            invalid(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::load_from_string(&content, format)?.validated()
    }

    /// Load a configuration from a string with the specified format.
    pub fn load_from_string(
        content: &str,
        format: ConfigFormat,
    ) -> Result<EnsembleConfig, SegError> {
        match format {
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| invalid(format!("Failed to parse TOML config: {e}"))),
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| invalid(format!("Failed to parse JSON config: {e}"))),
        }
    }

    /// Save a configuration to a file, auto-detecting the format from the extension.
    pub fn save_to_file(config: &EnsembleConfig, path: &Path) -> Result<(), SegError> {
        let format = ConfigFormat::from_extension(path).ok_or_else(|| {
            invalid(format!("Unsupported config file extension: {:?}", path.extension()))
        })?;

        let content = Self::save_to_string(config, format)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save a configuration to a string with the specified format.
    pub fn save_to_string(
        config: &EnsembleConfig,
        format: ConfigFormat,
    ) -> Result<String, SegError> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(config)
                .map_err(|e| invalid(format!("Failed to serialize config to TOML: {e}"))),
            ConfigFormat::Json => Ok(serde_json::to_string_pretty(config)?),
        }
    }
}

fn invalid(message: String) -> SegError {
    ConfigError::InvalidConfig { message }.into()
}
