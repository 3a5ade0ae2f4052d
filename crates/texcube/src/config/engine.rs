use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the entry-point file name
pub const ENTRY_PLACEHOLDER: &str = "{entry}";

/// Flag that disables `\write18` inside the engine
pub const NO_SHELL_ESCAPE_FLAG: &str = "-no-shell-escape";

/// Configuration for a typesetting engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    /// Human-readable name for the engine (e.g., "pdfLaTeX")
    pub name: String,

    /// Program to execute, either a bare name resolved through PATH or a path
    pub program: String,

    /// Arguments with placeholders
    /// Placeholders: {entry}
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables to set for every pass
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Engine {
    /// Expand placeholders in the argument list
    pub fn expand_args(&self, entry: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(ENTRY_PLACEHOLDER, entry))
            .collect()
    }

    /// Check whether the engine is invoked with shell escape disabled
    pub fn disables_shell_escape(&self) -> bool {
        self.args.iter().any(|arg| arg == NO_SHELL_ESCAPE_FLAG)
    }

    /// Check whether the arguments reference the entry point
    pub fn takes_entry(&self) -> bool {
        self.args.iter().any(|arg| arg.contains(ENTRY_PLACEHOLDER))
    }

    /// Locate the program the way a spawn would, through PATH for bare names
    pub fn resolve_program(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }

    /// Check whether the program can be found and executed
    pub fn is_available(&self) -> bool {
        self.resolve_program().is_some()
    }
}
