//! A library for compiling untrusted LaTeX.
//!
//! Texcube accepts a single LaTeX document or a zip archive of a LaTeX
//! project, stages it in a private working area, screens it, runs a
//! configured engine for a bounded number of passes, interprets the log and
//! reports the outcome as a structured [`CompileResult`].
//!
//! # Features
//!
//! - **Archive safety**: entry names that escape the working area are rejected before anything is written.
//! - **Content screening**: macros that perform shell or file I/O are refused before the engine runs.
//! - **Pass control**: each pass runs under its own deadline and a timed-out engine is killed.
//! - **Log interpretation**: errors and warnings are extracted in order and the log is bounded for transport.
//! - **TOML configuration**: engines, limits and defaults, overridable from the environment.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Engine};
pub use runner::{CompileError, Compilation, Runner};
pub use types::{
    CompileInput, CompileOptions, CompileResult, FailureKind, InputKind, TransportLog,
    ValidationReport,
};
pub use workspace::{WorkingArea, WorkspaceError};

pub mod config;
pub mod diagnostics;
pub mod runner;
pub mod scan;
pub mod types;
pub mod workspace;
