//! Log interpretation
//!
//! Reduces raw engine output to ordered error and warning lists and prepares
//! a size-bounded copy of the log for transport.

use crate::types::TransportLog;

/// Prefix of an error line in TeX output
pub const ERROR_MARKER: &str = "! ";

/// Substring identifying a LaTeX warning line
pub const WARNING_MARKER: &str = "LaTeX Warning";

/// Appended to a log that was cut at the size ceiling
pub const TRUNCATION_MARKER: &str = "\n... [Truncated]";

/// Summary used when the log carries no error line
pub const GENERIC_FAILURE: &str = "Compilation failed";

/// Errors and warnings extracted from a log, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Diagnostics {
    /// Scan a log line by line
    pub fn parse(log: &str) -> Self {
        let mut diagnostics = Self::default();
        for line in log.lines() {
            if let Some(message) = line.strip_prefix(ERROR_MARKER) {
                diagnostics.errors.push(message.trim().to_string());
            }
            if line.contains(WARNING_MARKER) {
                diagnostics.warnings.push(line.trim().to_string());
            }
        }
        diagnostics
    }

    /// User-facing summary of a failed compilation
    pub fn primary_error(&self, log: &str) -> String {
        self.errors
            .first()
            .cloned()
            .or_else(|| first_error_line(log))
            .unwrap_or_else(|| GENERIC_FAILURE.to_string())
    }
}

/// Find the first error line in a log
pub fn first_error_line(log: &str) -> Option<String> {
    log.lines()
        .find_map(|line| line.strip_prefix(ERROR_MARKER))
        .map(|message| message.trim().to_string())
}

/// Cut `log` to at most `limit` bytes (on a char boundary) plus the marker
///
/// Returns the text and whether it was truncated.
pub fn truncate_log(log: &str, limit: usize) -> (String, bool) {
    if log.len() <= limit {
        return (log.to_string(), false);
    }
    let mut cut = limit;
    while !log.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut text = String::with_capacity(cut + TRUNCATION_MARKER.len());
    text.push_str(&log[..cut]);
    text.push_str(TRUNCATION_MARKER);
    (text, true)
}

/// Build the transport log: diagnostics come from the full log, the text is
/// truncated to `limit`
pub fn interpret(log: &str, limit: usize) -> TransportLog {
    let Diagnostics { errors, warnings } = Diagnostics::parse(log);
    let (text, truncated) = truncate_log(log, limit);
    TransportLog {
        text,
        truncated,
        errors,
        warnings,
    }
}
