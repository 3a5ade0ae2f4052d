use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{Config, DEFAULT_ENGINE};

/// Kind of payload submitted for compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// A single LaTeX source file
    Document,

    /// A zip archive holding a LaTeX project
    Archive,
}

impl InputKind {
    /// Infer the kind from an uploaded file name (`.tex` or `.zip`)
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "tex" => Some(InputKind::Document),
            "zip" => Some(InputKind::Archive),
            _ => None,
        }
    }
}

/// Raw payload handed to the orchestrator
#[derive(Debug, Clone)]
pub struct CompileInput {
    pub kind: InputKind,
    pub bytes: Vec<u8>,
}

impl CompileInput {
    pub fn new(kind: InputKind, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            bytes: bytes.into(),
        }
    }

    /// A single document given as source text
    pub fn document(source: impl Into<Vec<u8>>) -> Self {
        Self::new(InputKind::Document, source)
    }

    /// A zip archive given as raw bytes
    pub fn archive(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(InputKind::Archive, bytes)
    }
}

/// Per-request compilation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Engine ID as configured in [`Config::engines`]
    pub engine: String,

    /// Number of compiler passes to run
    pub passes: u32,

    /// Entry-point override for archives
    #[serde(default)]
    pub entry_file: Option<String>,

    /// Wall-clock budget for each pass in seconds
    pub timeout_seconds: u64,
}

impl CompileOptions {
    /// Options populated from the configured defaults
    pub fn from_config(config: &Config) -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            passes: config.default_passes,
            entry_file: None,
            timeout_seconds: config.default_timeout_seconds,
        }
    }

    /// Set the engine ID
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    /// Set the number of passes
    pub fn with_passes(mut self, passes: u32) -> Self {
        self.passes = passes;
        self
    }

    /// Set the entry-point override
    pub fn with_entry_file(mut self, entry: impl Into<String>) -> Self {
        self.entry_file = Some(entry.into());
        self
    }

    /// Set the per-pass timeout in seconds
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            passes: 2,
            entry_file: None,
            timeout_seconds: 20,
        }
    }
}

/// Classification of a failed compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    PayloadTooLarge,
    UnsafeArchivePath,
    DangerousContentDetected,
    EntryNotFound,
    AmbiguousEntry,
    NoEntryFound,
    ToolUnavailable,
    TimedOut,
    CompileFailed,
    InternalError,
}

/// Outcome of one compilation request
///
/// `artifact_path` is present exactly when `success` is true, while
/// `error_message` and `failure` are present exactly when it is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileResult {
    pub success: bool,
    pub artifact_path: Option<PathBuf>,
    pub elapsed_ms: u64,
    pub log: String,
    pub log_truncated: bool,
    pub error_message: Option<String>,
    pub failure: Option<FailureKind>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Number of passes that were started
    pub passes_run: u32,
}

impl CompileResult {
    /// Build a successful result
    pub fn success(artifact_path: PathBuf, log: TransportLog, passes_run: u32) -> Self {
        Self {
            success: true,
            artifact_path: Some(artifact_path),
            elapsed_ms: 0,
            log: log.text,
            log_truncated: log.truncated,
            error_message: None,
            failure: None,
            errors: log.errors,
            warnings: log.warnings,
            passes_run,
        }
    }

    /// Build a failed result
    pub fn failure(
        kind: FailureKind,
        message: impl Into<String>,
        log: TransportLog,
        passes_run: u32,
    ) -> Self {
        Self {
            success: false,
            artifact_path: None,
            elapsed_ms: 0,
            log: log.text,
            log_truncated: log.truncated,
            error_message: Some(message.into()),
            failure: Some(kind),
            errors: log.errors,
            warnings: log.warnings,
            passes_run,
        }
    }

    /// Record the elapsed wall time
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Check if the compilation produced an artifact
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success && self.artifact_path.is_some()
    }
}

/// Outcome of a compile-only check of a document, without the artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub compilable: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub log: String,
    pub log_truncated: bool,
    pub compile_time_ms: u64,
}

impl From<CompileResult> for ValidationReport {
    fn from(result: CompileResult) -> Self {
        Self {
            compilable: result.success,
            errors: result.errors,
            warnings: result.warnings,
            log: result.log,
            log_truncated: result.log_truncated,
            compile_time_ms: result.elapsed_ms,
        }
    }
}

/// Log prepared for the caller: possibly truncated text plus the diagnostics
/// extracted from the complete log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportLog {
    pub text: String,
    pub truncated: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TransportLog {
    /// A short log with no diagnostics
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}
