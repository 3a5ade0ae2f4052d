//! Compilation orchestrator for texcube
//!
//! Stages input into a working area, screens it, runs the engine passes and
//! assembles the outcome into a [`CompileResult`].

use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use crate::runner::materialize::{ENTRY_NAME, extract_archive, materialize, resolve_entry};
pub use crate::runner::passes::{
    PassError, PassReport, PassState, pass_marker, run_passes, timeout_marker,
};

mod materialize;
mod passes;

use crate::config::Config;
use crate::diagnostics::{self, Diagnostics};
use crate::scan::ScanError;
use crate::types::{
    CompileInput, CompileOptions, CompileResult, FailureKind, TransportLog, ValidationReport,
};
use crate::workspace::{WorkingArea, WorkspaceError};

/// Name of the artifact produced by the engine (see `-jobname=main`)
pub const ARTIFACT_NAME: &str = "main.pdf";

/// Errors that end a compilation
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("payload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Invalid path in archive: {0}")]
    UnsafeArchivePath(String),

    #[error("Dangerous macro detected: {token} (in {file})")]
    DangerousContent { file: String, token: &'static str },

    #[error("entry file '{0}' not found in archive")]
    EntryNotFound(String),

    #[error("multiple .tex files found ({}); specify the entry file", .0.join(", "))]
    AmbiguousEntry(Vec<String>),

    #[error("no .tex files found in archive")]
    NoEntryFound,

    #[error("{program} binary not found: {source}")]
    ToolUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compilation timed out after {seconds}s")]
    TimedOut { seconds: u64 },

    #[error("compilation failed: {0}")]
    CompileFailed(String),

    #[error("working area error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl CompileError {
    /// Classify the error for callers
    pub fn kind(&self) -> FailureKind {
        match self {
            CompileError::InvalidInput(_) => FailureKind::InvalidInput,
            CompileError::PayloadTooLarge { .. } => FailureKind::PayloadTooLarge,
            CompileError::UnsafeArchivePath(_) => FailureKind::UnsafeArchivePath,
            CompileError::DangerousContent { .. } => FailureKind::DangerousContentDetected,
            CompileError::EntryNotFound(_) => FailureKind::EntryNotFound,
            CompileError::AmbiguousEntry(_) => FailureKind::AmbiguousEntry,
            CompileError::NoEntryFound => FailureKind::NoEntryFound,
            CompileError::ToolUnavailable { .. } => FailureKind::ToolUnavailable,
            CompileError::TimedOut { .. } => FailureKind::TimedOut,
            CompileError::CompileFailed(_) => FailureKind::CompileFailed,
            CompileError::Workspace(_) | CompileError::Io(_) | CompileError::Internal(_) => {
                FailureKind::InternalError
            }
        }
    }

    /// Short message for the result's `error_message`
    pub fn summary(&self) -> String {
        match self {
            CompileError::InvalidInput(_) => "Invalid input".to_string(),
            CompileError::PayloadTooLarge { .. } => "Payload too large".to_string(),
            CompileError::UnsafeArchivePath(_) => "Unsafe path in archive".to_string(),
            CompileError::DangerousContent { token, .. } => {
                format!("Dangerous macro detected: {token}")
            }
            CompileError::EntryNotFound(_) => "Main file not found".to_string(),
            CompileError::AmbiguousEntry(_) => "Ambiguous main file".to_string(),
            CompileError::NoEntryFound => "No .tex files found".to_string(),
            CompileError::ToolUnavailable { program, .. } => format!("{program} binary not found"),
            CompileError::TimedOut { .. } => "Compilation timed out".to_string(),
            CompileError::CompileFailed(message) => message.clone(),
            CompileError::Workspace(_) | CompileError::Io(_) | CompileError::Internal(_) => {
                format!("Internal error: {self}")
            }
        }
    }
}

impl From<ScanError> for CompileError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::DangerousContent { file, token } => {
                CompileError::DangerousContent { file, token }
            }
            ScanError::UnsafeArchivePath(name) => CompileError::UnsafeArchivePath(name),
        }
    }
}

/// A finished compilation and the working area holding its artifact
///
/// The working area is removed when this value is dropped or closed, so read
/// the artifact first.
#[derive(Debug)]
pub struct Compilation {
    result: CompileResult,
    area: Option<WorkingArea>,
}

impl Compilation {
    /// Get the result
    pub fn result(&self) -> &CompileResult {
        &self.result
    }

    /// Take the result, removing the working area
    pub fn into_result(self) -> CompileResult {
        self.result
    }

    /// Get the artifact path, if the compilation succeeded
    pub fn artifact_path(&self) -> Option<&PathBuf> {
        self.result.artifact_path.as_ref()
    }

    /// Read the artifact, if the compilation succeeded
    pub async fn artifact_bytes(&self) -> Result<Option<Vec<u8>>, WorkspaceError> {
        match (&self.area, self.result.success) {
            (Some(area), true) => area.read_file(ARTIFACT_NAME).await.map(Some),
            _ => Ok(None),
        }
    }

    /// Remove the working area, returning the result
    pub fn close(mut self) -> Result<CompileResult, WorkspaceError> {
        if let Some(area) = self.area.take() {
            area.close()?;
        }
        Ok(self.result)
    }
}

/// High-level runner for LaTeX compilation
#[derive(Debug, Clone)]
pub struct Runner {
    config: Config,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Default options for this runner's configuration
    pub fn default_options(&self) -> CompileOptions {
        CompileOptions::from_config(&self.config)
    }

    /// Default options for [`Runner::validate_source`]: a single pass
    pub fn validation_options(&self) -> CompileOptions {
        self.default_options().with_passes(1)
    }

    /// Check whether a document compiles, without keeping the artifact
    ///
    /// Blank source is rejected before a working area is created. Any other
    /// outcome, including a rejection by the scanner, is a report.
    #[instrument(skip(self, source), fields(engine = %options.engine))]
    pub async fn validate_source(
        &self,
        source: &str,
        options: CompileOptions,
    ) -> Result<ValidationReport, CompileError> {
        if source.trim().is_empty() {
            return Err(CompileError::InvalidInput("no source code provided".to_string()));
        }
        let compilation = self
            .compile(CompileInput::document(source.as_bytes()), options)
            .await;
        let result = compilation.close()?;
        Ok(ValidationReport::from(result))
    }

    /// Compile a document or archive
    ///
    /// Never fails: every error, including a panic inside the pipeline, is
    /// reported as an unsuccessful [`CompileResult`]. Dropping the returned
    /// future kills a running engine process and removes the working area.
    #[instrument(skip(self, input), fields(kind = ?input.kind, engine = %options.engine))]
    pub async fn compile(&self, input: CompileInput, options: CompileOptions) -> Compilation {
        let started_at = Instant::now();
        let runner = self.clone();
        let task = AbortOnDrop(tokio::spawn(async move {
            runner.run_pipeline(&input, &options).await
        }));

        let (result, area) = match task.join().await {
            Ok(Ok(assembled)) => assembled,
            Ok(Err(e)) => (self.failure_result(&e, "", 0), None),
            Err(join_error) => {
                warn!(error = %join_error, "compilation task panicked");
                let message = join_error.to_string();
                let result = CompileResult::failure(
                    FailureKind::InternalError,
                    format!("Internal error: {message}"),
                    TransportLog::plain(message),
                    0,
                );
                (result, None)
            }
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        let result = result.with_elapsed_ms(elapsed_ms);
        info!(
            success = result.success,
            failure = ?result.failure,
            passes = result.passes_run,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            elapsed_ms,
            "compilation finished"
        );

        Compilation { result, area }
    }

    /// Materialize, scan, run passes and assemble
    ///
    /// Errors returned here happened before a log existed. Once a pass has
    /// started, failures are assembled into a result that keeps its output.
    async fn run_pipeline(
        &self,
        input: &CompileInput,
        options: &CompileOptions,
    ) -> Result<(CompileResult, Option<WorkingArea>), CompileError> {
        self.check_request(input, options)?;
        let engine = self
            .config
            .get_engine(&options.engine)
            .map_err(|e| CompileError::InvalidInput(e.to_string()))?;

        let area = WorkingArea::create()?;
        let entry = materialize(
            &area,
            input,
            options.entry_file.as_deref(),
            self.config.max_extracted_bytes,
        )
        .await?;
        debug!(entry, "entry point resolved");

        let outcome = run_passes(
            engine,
            area.path(),
            &entry,
            options.passes,
            Duration::from_secs(options.timeout_seconds),
        )
        .await;
        let report = match outcome {
            Ok(report) => report,
            Err(PassError {
                error,
                log,
                passes_run,
            }) => return Ok((self.failure_result(&error, &log, passes_run), None)),
        };

        let result = self.assemble(&area, &report, options).await?;
        Ok((result, Some(area)))
    }

    /// Reject requests the pipeline cannot run
    fn check_request(
        &self,
        input: &CompileInput,
        options: &CompileOptions,
    ) -> Result<(), CompileError> {
        if input.bytes.is_empty() {
            return Err(CompileError::InvalidInput("empty payload".to_string()));
        }
        let size = input.bytes.len() as u64;
        if size > self.config.max_upload_bytes {
            return Err(CompileError::PayloadTooLarge {
                size,
                limit: self.config.max_upload_bytes,
            });
        }
        if options.passes == 0 || options.passes > self.config.max_passes {
            return Err(CompileError::InvalidInput(format!(
                "passes must be between 1 and {}, got {}",
                self.config.max_passes, options.passes
            )));
        }
        if options.timeout_seconds == 0 {
            return Err(CompileError::InvalidInput(
                "timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Turn the terminal pass state into a result
    async fn assemble(
        &self,
        area: &WorkingArea,
        report: &PassReport,
        options: &CompileOptions,
    ) -> Result<CompileResult, CompileError> {
        let log = diagnostics::interpret(&report.log, self.config.log_limit_bytes);
        let produced = area.file_exists(ARTIFACT_NAME).await?;

        let result = match report.state {
            PassState::Exhausted if produced => {
                let artifact = area.file_path(ARTIFACT_NAME)?;
                CompileResult::success(artifact, log, report.passes_run)
            }
            PassState::TimedOut { .. } => {
                let error = CompileError::TimedOut {
                    seconds: options.timeout_seconds,
                };
                CompileResult::failure(error.kind(), error.summary(), log, report.passes_run)
            }
            PassState::Exhausted | PassState::Failed { .. } | PassState::Running(_) => {
                let message = Diagnostics {
                    errors: log.errors.clone(),
                    warnings: Vec::new(),
                }
                .primary_error(&report.log);
                let error = CompileError::CompileFailed(message);
                CompileResult::failure(error.kind(), error.summary(), log, report.passes_run)
            }
        };
        Ok(result)
    }

    /// Result for an error that ended the pipeline
    ///
    /// `earlier` is the raw output of the passes that completed. The error
    /// text is appended to it and the whole is interpreted as one log.
    fn failure_result(&self, error: &CompileError, earlier: &str, passes_run: u32) -> CompileResult {
        let kind = error.kind();
        if kind == FailureKind::InternalError {
            warn!(error = %error, passes_run, "internal error during compilation");
        } else {
            debug!(error = %error, ?kind, passes_run, "compilation rejected");
        }

        let mut text = earlier.to_string();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&error.to_string());
        let log = diagnostics::interpret(&text, self.config.log_limit_bytes);
        CompileResult::failure(kind, error.summary(), log, passes_run)
    }
}

/// Join handle that aborts its task when dropped
struct AbortOnDrop<T>(tokio::task::JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> Result<T, tokio::task::JoinError> {
        (&mut self.0).await
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
