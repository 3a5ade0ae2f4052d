//! Integration tests for texcube
//!
//! Most tests drive the orchestrator with small shell scripts standing in for
//! the TeX engine, so they only need a POSIX shell. Tests against a real
//! pdflatex are gated behind the `integration-tests` feature and ignored by
//! default:
//!   cargo test -p texcube --features integration-tests -- --include-ignored

#![cfg(unix)]

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
#[cfg(target_os = "linux")]
use std::time::Duration;

use tempfile::TempDir;
use texcube::{Config, Engine, Runner};
use zip::write::SimpleFileOptions;

mod config_loading;
mod limits;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Engine that prints a banner, writes `main.pdf` and exits cleanly
pub(crate) const SUCCEEDING_ENGINE: &str = r#"
for arg; do entry="$arg"; done
echo "This is FakeTeX (entry $entry)"
echo "LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right."
printf '%%PDF-1.4\n%%fake\n' > main.pdf
"#;

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> Vec<u8> {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// A runner whose `pdflatex` engine is a shell script
pub(crate) struct FakeTex {
    pub runner: Runner,
    tools: TempDir,
}

impl FakeTex {
    /// Directory holding the script, outside any working area
    pub(crate) fn tools_dir(&self) -> &Path {
        self.tools.path()
    }
}

pub(crate) fn fake_tex(script: &str) -> FakeTex {
    fake_tex_with(Config::default(), script)
}

pub(crate) fn fake_tex_with(config: Config, script: &str) -> FakeTex {
    let tools = tempfile::tempdir().expect("Failed to create tools dir");
    let path = tools.path().join("fake-pdflatex");
    fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("Failed to write script");
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();

    let engine = Engine {
        name: "FakeTeX".to_string(),
        program: path.to_string_lossy().into_owned(),
        args: vec![
            "-interaction=nonstopmode".to_string(),
            "-no-shell-escape".to_string(),
            "-jobname=main".to_string(),
            "{entry}".to_string(),
        ],
        env: HashMap::new(),
    };
    let runner = Runner::new(config.with_engine("pdflatex", engine));
    FakeTex { runner, tools }
}

/// Build a zip archive in memory
pub(crate) fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("Failed to start zip entry");
        writer
            .write_all(content.as_bytes())
            .expect("Failed to write zip entry");
    }
    writer.finish().expect("Failed to finish zip").into_inner()
}

/// Poll `check` for up to five seconds
#[cfg(target_os = "linux")]
pub(crate) async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    check()
}

/// Read a pid written by a fake engine
#[cfg(target_os = "linux")]
pub(crate) fn read_pid(path: &Path) -> u32 {
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("no pid at {path:?}: {e}"));
    text.trim().parse().expect("pid file holds a number")
}

/// Check that a process has exited; a zombie awaiting its reaper counts
#[cfg(target_os = "linux")]
pub(crate) fn process_gone(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}
