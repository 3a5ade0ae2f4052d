//! Compiler pass loop
//!
//! Runs the engine against the entry point up to `passes` times. Each pass has
//! its own wall-clock deadline; a pass that overruns is killed and reaped
//! before the loop ends.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use crate::config::Engine;
use crate::runner::CompileError;

/// State of the pass loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// The given (1-based) pass is about to run
    Running(u32),

    /// The given pass exited with a non-zero status
    Failed { pass: u32, exit_code: Option<i32> },

    /// The given pass exceeded its deadline
    TimedOut { pass: u32 },

    /// Every pass exited cleanly
    Exhausted,
}

impl PassState {
    /// Check if the loop has stopped
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PassState::Running(_))
    }
}

/// Accumulated output and the terminal state of the pass loop
#[derive(Debug, Clone)]
pub struct PassReport {
    pub state: PassState,
    pub log: String,
    pub passes_run: u32,
}

/// Marker written before each pass's output
pub fn pass_marker(pass: u32) -> String {
    format!("--- Pass {pass} ---\n")
}

/// Marker written when a pass exceeds its deadline
pub fn timeout_marker(seconds: u64) -> String {
    format!("\n--- Timeout after {seconds}s ---")
}

/// Outcome of one engine invocation
enum PassOutcome {
    Exited { exit_code: Option<i32>, output: String },
    TimedOut,
}

/// A pass loop stopped by an error, with the output gathered before it
#[derive(Debug)]
pub struct PassError {
    pub error: CompileError,
    pub log: String,
    /// Passes that ran to completion before the error
    pub passes_run: u32,
}

/// Run the pass loop in `work_dir`
#[instrument(skip(engine), fields(program = %engine.program))]
pub async fn run_passes(
    engine: &Engine,
    work_dir: &Path,
    entry: &str,
    passes: u32,
    timeout: Duration,
) -> Result<PassReport, PassError> {
    let mut log = String::new();
    let mut state = PassState::Running(1);
    let mut passes_run = 0;

    while let PassState::Running(pass) = state {
        if pass > passes {
            state = PassState::Exhausted;
            break;
        }

        let started_at = Instant::now();
        let outcome = match run_pass(engine, work_dir, entry, timeout).await {
            Ok(outcome) => outcome,
            Err(error) => {
                return Err(PassError {
                    error,
                    log,
                    passes_run,
                });
            }
        };
        passes_run = pass;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        state = match outcome {
            PassOutcome::Exited { exit_code, output } => {
                log.push_str(&pass_marker(pass));
                log.push_str(&output);
                debug!(pass, ?exit_code, elapsed_ms, "pass finished");
                if exit_code == Some(0) {
                    PassState::Running(pass + 1)
                } else {
                    PassState::Failed { pass, exit_code }
                }
            }
            PassOutcome::TimedOut => {
                log.push_str(&timeout_marker(timeout.as_secs()));
                warn!(pass, elapsed_ms, "pass timed out");
                PassState::TimedOut { pass }
            }
        };
    }

    debug_assert!(state.is_terminal());
    Ok(PassReport {
        state,
        log,
        passes_run,
    })
}

/// Invoke the engine once and wait for it under `timeout`
///
/// The deadline covers both the exit of the engine and the draining of its
/// pipes, so a descendant holding them open cannot stretch the pass.
async fn run_pass(
    engine: &Engine,
    work_dir: &Path,
    entry: &str,
    timeout: Duration,
) -> Result<PassOutcome, CompileError> {
    let args = engine.expand_args(entry);
    debug!(?args, "spawning engine");

    let mut command = Command::new(&engine.program);
    command
        .args(&args)
        .envs(&engine.env)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|source| match source.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => CompileError::ToolUnavailable {
            program: engine.program.clone(),
            source,
        },
        _ => CompileError::Internal(format!("failed to spawn {}: {source}", engine.program)),
    })?;
    let group = ProcessGroup::of(&child);

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));
    let readers = [stdout_task.abort_handle(), stderr_task.abort_handle()];

    let finished = async {
        let status = child.wait().await;
        let (stdout, stderr) = tokio::join!(join_stream(stdout_task), join_stream(stderr_task));
        (status, stdout, stderr)
    };
    let outcome = tokio::time::timeout(timeout, finished).await;

    let Ok((status, mut output, stderr)) = outcome else {
        terminate(&group, &mut child).await;
        for reader in &readers {
            reader.abort();
        }
        return Ok(PassOutcome::TimedOut);
    };
    let status = status.map_err(|e| CompileError::Internal(format!("wait failed: {e}")))?;

    if !output.is_empty() && !stderr.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(&stderr);

    Ok(PassOutcome::Exited {
        exit_code: status.code(),
        output,
    })
}

/// Kill an overrunning engine with all its descendants and reap it
async fn terminate(group: &ProcessGroup, child: &mut Child) {
    group.kill();
    // The engine itself may have exited while a descendant held the pipes
    let _ = child.start_kill();
    if let Err(e) = child.wait().await {
        warn!(error = %e, "failed to reap engine process");
    }
}

/// Process group of one engine invocation, killed as a whole when dropped
///
/// Dropping it at the end of every pass, or when the pass future is
/// cancelled, leaves no background process behind.
struct ProcessGroup(Option<i32>);

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self(child.id().and_then(|id| i32::try_from(id).ok()))
    }

    #[cfg(unix)]
    fn kill(&self) {
        let Some(pgid) = self.0 else { return };
        // SAFETY: signals only the group created for this pass via `process_group(0)`
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(pgid, error = %err, "failed to kill engine process group");
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn read_stream<R>(stream: Option<R>) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut stream) = stream
        && let Err(e) = stream.read_to_end(&mut buf).await
    {
        warn!(error = %e, "failed to read engine output");
    }
    buf
}

async fn join_stream(task: tokio::task::JoinHandle<Vec<u8>>) -> String {
    match task.await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(error = %e, "engine output reader failed");
            String::new()
        }
    }
}
