use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::engine::{ENTRY_PLACEHOLDER, Engine, NO_SHELL_ESCAPE_FLAG};

pub mod engine;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../texcube.example.toml");

/// Engine used when a request does not name one
pub const DEFAULT_ENGINE: &str = "pdflatex";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("engine '{0}' not found in configuration")]
    EngineNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for texcube
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Wall-clock budget for one compiler pass, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,

    /// Number of passes when a request does not specify one
    #[serde(default = "default_passes")]
    pub default_passes: u32,

    /// Upper bound on the number of passes a request may ask for
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,

    /// Largest accepted input payload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Largest total uncompressed archive size in bytes
    #[serde(default = "default_max_extracted_bytes")]
    pub max_extracted_bytes: u64,

    /// Size ceiling of the log handed back to callers, in bytes
    #[serde(default = "default_log_limit_bytes")]
    pub log_limit_bytes: usize,

    /// Engine configurations keyed by engine ID
    #[serde(default)]
    pub engines: HashMap<String, Engine>,
}

impl Config {
    /// Create a new config with the embedded default engines
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no engines
    pub fn empty() -> Self {
        Self {
            default_timeout_seconds: default_timeout_seconds(),
            default_passes: default_passes(),
            max_passes: default_max_passes(),
            max_upload_bytes: default_max_upload_bytes(),
            max_extracted_bytes: default_max_extracted_bytes(),
            log_limit_bytes: default_log_limit_bytes(),
            engines: HashMap::new(),
        }
    }

    /// Get an engine by ID
    pub fn get_engine(&self, id: &str) -> Result<&Engine, ConfigError> {
        self.engines
            .get(id)
            .ok_or_else(|| ConfigError::EngineNotFound(id.to_string()))
    }

    /// Register an engine under the given ID
    pub fn with_engine(mut self, id: impl Into<String>, engine: Engine) -> Self {
        self.engines.insert(id.into(), engine);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_timeout_seconds() -> u64 {
    20
}

fn default_passes() -> u32 {
    2
}

fn default_max_passes() -> u32 {
    5
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_max_extracted_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_log_limit_bytes() -> usize {
    50 * 1024
}
