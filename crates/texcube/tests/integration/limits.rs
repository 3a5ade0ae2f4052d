use std::collections::HashMap;
use std::time::{Duration, Instant};

use texcube::diagnostics::TRUNCATION_MARKER;
use texcube::{CompileInput, Config, Engine, FailureKind, Runner};

use super::{SUCCEEDING_ENGINE, fake_tex, fake_tex_with, fixture_source, zip_of};
#[cfg(target_os = "linux")]
use super::{eventually, process_gone, read_pid};

#[tokio::test]
async fn test_timeout_kills_engine() {
    let tex = fake_tex("exec sleep 30");
    let options = tex.runner.default_options().with_timeout_seconds(1);

    let started_at = Instant::now();
    let result = tex
        .runner
        .compile(CompileInput::document(fixture_source("hello.tex")), options)
        .await
        .into_result();

    assert!(started_at.elapsed() < Duration::from_secs(10));
    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::TimedOut));
    assert_eq!(
        result.error_message.as_deref(),
        Some("Compilation timed out")
    );
    assert!(result.log.contains("--- Timeout after 1s ---"));
    assert!(result.artifact_path.is_none());
    assert_eq!(result.passes_run, 1);
}

#[tokio::test]
async fn test_timeout_covers_background_children_holding_output() {
    let tex = fake_tex("sleep 8 &\necho started");
    let options = tex
        .runner
        .default_options()
        .with_passes(1)
        .with_timeout_seconds(1);

    let started_at = Instant::now();
    let result = tex
        .runner
        .compile(CompileInput::document(fixture_source("hello.tex")), options)
        .await
        .into_result();

    assert!(
        started_at.elapsed() < Duration::from_secs(5),
        "took {:?}",
        started_at.elapsed()
    );
    assert_eq!(result.failure, Some(FailureKind::TimedOut));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_background_children() {
    let tex = fake_tex("sleep 30 &\necho $! > \"$(dirname \"$0\")/child.pid\"\nwait");
    let options = tex.runner.default_options().with_timeout_seconds(1);

    let result = tex
        .runner
        .compile(CompileInput::document(fixture_source("hello.tex")), options)
        .await
        .into_result();

    assert_eq!(result.failure, Some(FailureKind::TimedOut));
    let pid = read_pid(&tex.tools_dir().join("child.pid"));
    assert!(eventually(|| process_gone(pid)).await, "pid {pid} survived");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cancelled_compile_kills_engine_and_removes_area() {
    let tex = fake_tex(
        r#"
pwd > "$(dirname "$0")/engine.cwd"
echo $$ > "$(dirname "$0")/engine.pid"
exec sleep 30
"#,
    );
    let pid_file = tex.tools_dir().join("engine.pid");
    let compile = tex.runner.compile(
        CompileInput::document(fixture_source("hello.tex")),
        tex.runner.default_options().with_passes(1),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(2), compile).await;
    assert!(outcome.is_err(), "compile finished before it was cancelled");
    assert!(eventually(|| pid_file.exists()).await);

    let pid = read_pid(&pid_file);
    let cwd = std::fs::read_to_string(tex.tools_dir().join("engine.cwd")).unwrap();
    let area = std::path::PathBuf::from(cwd.trim());
    assert!(
        area.file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("texcube-"))
    );

    assert!(eventually(|| process_gone(pid)).await, "engine {pid} survived");
    assert!(eventually(|| !area.exists()).await, "{} survived", area.display());
}

#[tokio::test]
async fn test_engine_vanishing_between_passes_keeps_earlier_log() {
    let tex = fake_tex(
        r#"
echo "LaTeX Warning: first pass"
printf '%%PDF-1.4\n' > main.pdf
rm -f "$0"
"#,
    );
    let options = tex.runner.default_options().with_passes(2);

    let result = tex
        .runner
        .compile(CompileInput::document(fixture_source("hello.tex")), options)
        .await
        .into_result();

    assert_eq!(result.failure, Some(FailureKind::ToolUnavailable));
    assert_eq!(result.passes_run, 1);
    assert_eq!(result.warnings, vec!["LaTeX Warning: first pass"]);
    assert!(
        result.log.starts_with("--- Pass 1 ---\nLaTeX Warning: first pass\n"),
        "{}",
        result.log
    );
    assert!(result.log.contains("binary not found"), "{}", result.log);
    assert!(result.artifact_path.is_none());
}

#[tokio::test]
async fn test_timeout_in_later_pass_keeps_diagnostics() {
    let tex = fake_tex(
        r#"
if [ -f pass-one.done ]; then exec sleep 30; fi
touch pass-one.done
echo "LaTeX Warning: Citation 'knuth' undefined."
printf '%%PDF-1.4\n' > main.pdf
"#,
    );
    let options = tex
        .runner
        .default_options()
        .with_passes(2)
        .with_timeout_seconds(1);

    let result = tex
        .runner
        .compile(CompileInput::document(fixture_source("hello.tex")), options)
        .await
        .into_result();

    assert_eq!(result.failure, Some(FailureKind::TimedOut));
    assert_eq!(result.passes_run, 2);
    assert_eq!(
        result.warnings,
        vec!["LaTeX Warning: Citation 'knuth' undefined."]
    );
    // A partial PDF from an earlier pass is not an artifact
    assert!(result.artifact_path.is_none());
}

#[tokio::test]
async fn test_missing_engine_binary() {
    let engine = Engine {
        name: "Missing".to_string(),
        program: "/nonexistent/texcube/pdflatex".to_string(),
        args: vec!["-no-shell-escape".to_string(), "{entry}".to_string()],
        env: HashMap::new(),
    };
    let runner = Runner::new(Config::default().with_engine("pdflatex", engine));

    let result = runner
        .compile(
            CompileInput::document(fixture_source("hello.tex")),
            runner.default_options(),
        )
        .await
        .into_result();

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::ToolUnavailable));
    assert_eq!(
        result.error_message.as_deref(),
        Some("/nonexistent/texcube/pdflatex binary not found")
    );
}

#[tokio::test]
async fn test_long_log_truncated_with_diagnostics() {
    let tex = fake_tex(
        r#"
i=0
while [ $i -lt 1200 ]; do
  echo "Overfull \hbox (badness 10000) in paragraph at lines $i--$i padding"
  i=$((i + 1))
done
echo "! Late fatal error."
exit 1
"#,
    );
    let options = tex.runner.default_options();
    let limit = tex.runner.config().log_limit_bytes;

    let result = tex
        .runner
        .compile(CompileInput::document(fixture_source("hello.tex")), options)
        .await
        .into_result();

    assert!(result.log_truncated);
    assert!(result.log.ends_with(TRUNCATION_MARKER));
    assert_eq!(result.log.len(), limit + TRUNCATION_MARKER.len());
    assert!(!result.log.contains("Late fatal error"));
    assert_eq!(result.errors, vec!["Late fatal error."]);
    assert_eq!(result.error_message.as_deref(), Some("Late fatal error."));
}

#[tokio::test]
async fn test_payload_over_upload_limit() {
    let mut config = Config::default();
    config.max_upload_bytes = 16;
    let tex = fake_tex_with(config, SUCCEEDING_ENGINE);

    let result = tex
        .runner
        .compile(
            CompileInput::document(fixture_source("hello.tex")),
            tex.runner.default_options(),
        )
        .await
        .into_result();

    assert_eq!(result.failure, Some(FailureKind::PayloadTooLarge));
    assert_eq!(result.passes_run, 0);
}

#[tokio::test]
async fn test_archive_inflating_past_limit() {
    let mut config = Config::default();
    config.max_extracted_bytes = 1024;
    let tex = fake_tex_with(config, SUCCEEDING_ENGINE);
    let padding = "%".repeat(64 * 1024);
    let archive = zip_of(&[("main.tex", padding.as_str())]);
    assert!(archive.len() < 4096, "padding should compress well");

    let result = tex
        .runner
        .compile(CompileInput::archive(archive), tex.runner.default_options())
        .await
        .into_result();

    assert_eq!(result.failure, Some(FailureKind::PayloadTooLarge));
}

#[tokio::test]
async fn test_pass_count_bounds() {
    let tex = fake_tex(SUCCEEDING_ENGINE);
    let max = tex.runner.config().max_passes;

    let too_many = tex
        .runner
        .compile(
            CompileInput::document(fixture_source("hello.tex")),
            tex.runner.default_options().with_passes(max + 1),
        )
        .await
        .into_result();
    assert_eq!(too_many.failure, Some(FailureKind::InvalidInput));

    let at_max = tex
        .runner
        .compile(
            CompileInput::document(fixture_source("hello.tex")),
            tex.runner.default_options().with_passes(max),
        )
        .await
        .into_result();
    assert!(at_max.success, "{at_max:?}");
    assert_eq!(at_max.passes_run, max);
}

#[tokio::test]
async fn test_elapsed_time_recorded() {
    let tex = fake_tex("sleep 1\nprintf '%%PDF-1.4\\n' > main.pdf");

    let result = tex
        .runner
        .compile(
            CompileInput::document(fixture_source("hello.tex")),
            tex.runner.default_options().with_passes(1),
        )
        .await
        .into_result();

    assert!(result.success, "{result:?}");
    assert!(result.elapsed_ms >= 1000, "elapsed {}ms", result.elapsed_ms);
}
