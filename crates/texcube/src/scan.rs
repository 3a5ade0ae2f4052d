//! Security screening for untrusted input
//!
//! Two checks run before the engine is ever spawned: a denylist scan of every
//! source file for macros that perform file or shell I/O, and a screen of
//! archive entry names against absolute paths and parent-directory traversal.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{instrument, warn};

/// Macros that can reach outside the working area.
///
/// Matched as raw substrings, so occurrences in comments are rejected too.
pub const DANGEROUS_MACROS: &[&str] = &[
    r"\write18",
    r"\immediate\write18",
    r"\input|",
    r"\openout",
    r"\openin",
    r"\newwrite",
    r"\newread",
];

/// A rejection raised by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("Dangerous macro detected: {token} (in {file})")]
    DangerousContent { file: String, token: &'static str },

    #[error("Invalid path in archive: {0}")]
    UnsafeArchivePath(String),
}

/// Return the first denylisted macro contained in `content`
pub fn find_dangerous_macro(content: &[u8]) -> Option<&'static str> {
    let text = String::from_utf8_lossy(content);
    DANGEROUS_MACROS
        .iter()
        .copied()
        .find(|token| text.contains(token))
}

/// Screen one source file
pub fn scan_source(file: &str, content: &[u8]) -> Result<(), ScanError> {
    match find_dangerous_macro(content) {
        Some(token) => {
            warn!(file, token, "dangerous macro rejected");
            Err(ScanError::DangerousContent {
                file: file.to_string(),
                token,
            })
        }
        None => Ok(()),
    }
}

/// Screen every regular file below `root`, returning the first rejection
///
/// Every file is read, whatever its extension: TeX can `\input` any file.
#[instrument]
pub fn scan_tree(root: &Path) -> std::io::Result<Option<ScanError>> {
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let content = std::fs::read(&path)?;
                let name = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                if let Err(rejection) = scan_source(&name, &content) {
                    return Ok(Some(rejection));
                }
            }
        }
    }
    Ok(None)
}

/// Check whether an archive entry name stays inside the extraction root
pub fn is_safe_entry_name(name: &str) -> bool {
    if name.is_empty() || name.contains('\0') {
        return false;
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return false;
    }
    // Drive-qualified names such as `C:foo` or `C:\foo`
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return false;
    }
    !name.split(['/', '\\']).any(|segment| segment == "..")
}

/// Leading characters that make pdflatex read its file argument as an
/// option, a format name or TeX code
const ARGUMENT_PREFIXES: &[char] = &['-', '&', '\\'];

/// Check whether an entry point name reaches the engine as a plain file name
pub fn is_plain_entry_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with(ARGUMENT_PREFIXES)
}

/// Screen one archive entry name
pub fn check_entry_name(name: &str) -> Result<(), ScanError> {
    if is_safe_entry_name(name) {
        Ok(())
    } else {
        warn!(entry = name, "unsafe archive path rejected");
        Err(ScanError::UnsafeArchivePath(name.to_string()))
    }
}
