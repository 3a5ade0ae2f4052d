//! Input staging
//!
//! Writes a document or unpacks an archive into the working area, screens
//! everything that landed there and resolves the entry point.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use zip::ZipArchive;

use crate::runner::CompileError;
use crate::scan::{self, ScanError};
use crate::types::{CompileInput, InputKind};
use crate::workspace::WorkingArea;

/// Canonical entry-point name
pub const ENTRY_NAME: &str = "main.tex";

/// Extension of document files considered as entry candidates
const DOCUMENT_EXTENSION: &str = "tex";

/// Unix file type bits of a symlink entry
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Stage `input` into `area` and return the entry-point name
#[instrument(skip(area, input), fields(kind = ?input.kind, len = input.bytes.len()))]
pub async fn materialize(
    area: &WorkingArea,
    input: &CompileInput,
    entry_override: Option<&str>,
    max_extracted_bytes: u64,
) -> Result<String, CompileError> {
    match input.kind {
        InputKind::Document => {
            scan::scan_source(ENTRY_NAME, &input.bytes)?;
            area.write_file(ENTRY_NAME, &input.bytes).await?;
            debug!("document staged");
            Ok(ENTRY_NAME.to_string())
        }
        InputKind::Archive => {
            let root = area.path().to_path_buf();
            let bytes = input.bytes.clone();
            let entry_override = entry_override.map(str::to_string);
            tokio::task::spawn_blocking(move || {
                extract_archive(&bytes, &root, max_extracted_bytes)?;
                if let Some(rejection) = scan::scan_tree(&root)? {
                    return Err(rejection.into());
                }
                resolve_entry(&root, entry_override.as_deref())
            })
            .await
            .map_err(|e| CompileError::Internal(format!("archive task failed: {e}")))?
        }
    }
}

/// Screen every entry name, then unpack the archive below `root`
///
/// Nothing is written unless every entry passes the screen.
pub fn extract_archive(bytes: &[u8], root: &Path, max_bytes: u64) -> Result<(), CompileError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CompileError::InvalidInput(format!("unreadable zip archive: {e}")))?;

    let mut declared: u64 = 0;
    for index in 0..archive.len() {
        let file = archive
            .by_index_raw(index)
            .map_err(|e| CompileError::InvalidInput(format!("corrupt zip entry {index}: {e}")))?;
        let name = file.name().to_string();
        scan::check_entry_name(&name)?;
        if file.enclosed_name().is_none() || is_symlink(file.unix_mode()) {
            return Err(ScanError::UnsafeArchivePath(name).into());
        }
        declared = declared.saturating_add(file.size());
    }
    if declared > max_bytes {
        return Err(CompileError::PayloadTooLarge {
            size: declared,
            limit: max_bytes,
        });
    }

    let mut written: u64 = 0;
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| CompileError::InvalidInput(format!("corrupt zip entry {index}: {e}")))?;
        let relative = file
            .enclosed_name()
            .ok_or_else(|| ScanError::UnsafeArchivePath(file.name().to_string()))?;
        let target = root.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Declared sizes can lie; bound what is actually inflated.
        let budget = max_bytes - written;
        let mut content = Vec::new();
        (&mut file).take(budget + 1).read_to_end(&mut content)?;
        if content.len() as u64 > budget {
            return Err(CompileError::PayloadTooLarge {
                size: written + content.len() as u64,
                limit: max_bytes,
            });
        }
        written += content.len() as u64;
        std::fs::write(&target, &content)?;
    }

    debug!(entries = archive.len(), bytes = written, "archive extracted");
    Ok(())
}

/// Resolve the entry point of an unpacked archive
///
/// Precedence: explicit override, then `main.tex`, then the only `.tex` file
/// at the archive root. Several candidates without either is ambiguous.
/// Names starting with `-`, `&` or `\` never become the entry point.
pub fn resolve_entry(root: &Path, entry_override: Option<&str>) -> Result<String, CompileError> {
    if let Some(entry) = entry_override {
        if !scan::is_plain_entry_name(entry) {
            return Err(CompileError::InvalidInput(format!(
                "entry file '{entry}' would be read as an engine option"
            )));
        }
        if !scan::is_safe_entry_name(entry) || !root.join(entry).is_file() {
            return Err(CompileError::EntryNotFound(entry.to_string()));
        }
        return Ok(entry.to_string());
    }

    if root.join(ENTRY_NAME).is_file() {
        return Ok(ENTRY_NAME.to_string());
    }

    let mut candidates = root_documents(root)?;
    match candidates.len() {
        0 => Err(CompileError::NoEntryFound),
        1 => Ok(candidates.remove(0)),
        _ => {
            candidates.sort();
            Err(CompileError::AmbiguousEntry(candidates))
        }
    }
}

/// Names of the `.tex` files directly below `root`
fn root_documents(root: &Path) -> std::io::Result<Vec<String>> {
    let mut documents = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path: PathBuf = entry.path();
        let is_document = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION));
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_document && scan::is_plain_entry_name(&name) {
            documents.push(name);
        }
    }
    Ok(documents)
}

fn is_symlink(mode: Option<u32>) -> bool {
    mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK)
}
