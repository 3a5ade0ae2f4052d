//! Configuration file loading for texcube
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, EXAMPLE_CONFIG};

/// Prefix of environment overrides (e.g. `TEXCUBE__DEFAULT_PASSES`)
const ENV_PREFIX: &str = "TEXCUBE";

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration layered as: embedded defaults, then the optional
    /// file, then `TEXCUBE__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::ReadFile {
                    path: path.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "default_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.default_passes == 0 {
            return Err(ConfigError::Invalid(
                "default_passes must be positive".to_string(),
            ));
        }
        if self.max_passes < self.default_passes {
            return Err(ConfigError::Invalid(format!(
                "max_passes ({}) is below default_passes ({})",
                self.max_passes, self.default_passes
            )));
        }
        if self.max_upload_bytes == 0 || self.max_extracted_bytes == 0 {
            return Err(ConfigError::Invalid(
                "size limits must be positive".to_string(),
            ));
        }
        if self.log_limit_bytes == 0 {
            return Err(ConfigError::Invalid(
                "log_limit_bytes must be positive".to_string(),
            ));
        }

        for (id, engine) in &self.engines {
            if engine.name.is_empty() {
                return Err(ConfigError::Invalid(format!("engine '{id}' has empty name")));
            }
            if engine.program.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "engine '{id}' has empty program"
                )));
            }
            if !engine.takes_entry() {
                return Err(ConfigError::Invalid(format!(
                    "engine '{id}' arguments never reference {{entry}}"
                )));
            }
            if !engine.disables_shell_escape() {
                return Err(ConfigError::Invalid(format!(
                    "engine '{id}' must pass -no-shell-escape"
                )));
            }
        }

        Ok(())
    }
}
