//! Texcube CLI
//!
//! A command-line tool for compiling LaTeX documents and projects.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use texcube::config::DEFAULT_ENGINE;
use texcube::{
    CompileInput, CompileResult, Config, EXAMPLE_CONFIG, InputKind, Runner, ValidationReport,
};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "texcube")]
#[command(about = "A tool for compiling untrusted LaTeX")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: texcube.toml)
        #[arg(short, long, default_value = "texcube.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Compile a .tex document or a .zip project
    Compile {
        /// Document or archive to compile
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Engine ID (e.g., pdflatex)
        #[arg(short, long)]
        engine: Option<String>,

        /// Number of compiler passes
        #[arg(short, long)]
        passes: Option<u32>,

        /// Entry file inside an archive
        #[arg(long)]
        entry: Option<String>,

        /// Per-pass timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Where to write the PDF (default: FILE with a .pdf extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a .tex document compiles, without writing a PDF
    Validate {
        /// Document to check
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Engine ID (e.g., pdflatex)
        #[arg(short, long)]
        engine: Option<String>,

        /// Number of compiler passes (default: 1)
        #[arg(short, long)]
        passes: Option<u32>,

        /// Per-pass timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured engines and whether their programs are installed
    Engines,

    /// Print service status and engine availability as JSON
    Health,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    if let Some(path) = &cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Compile {
            source,
            engine,
            passes,
            entry,
            timeout,
            output,
            json,
        } => {
            let request = CompileRequest {
                source,
                engine,
                passes,
                entry,
                timeout,
                output,
                json,
            };
            run_compile(config, request).await
        }
        Commands::Validate {
            source,
            engine,
            passes,
            timeout,
            json,
        } => {
            let request = ValidateRequest {
                source,
                engine,
                passes,
                timeout,
                json,
            };
            run_validate(config, request).await
        }
        Commands::Engines => {
            list_engines(&config);
            Ok(())
        }
        Commands::Health => print_health(&config),
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

/// Arguments of the compile command
struct CompileRequest {
    source: PathBuf,
    engine: Option<String>,
    passes: Option<u32>,
    entry: Option<String>,
    timeout: Option<u64>,
    output: Option<PathBuf>,
    json: bool,
}

async fn run_compile(config: Config, request: CompileRequest) -> Result<()> {
    let file_name = request
        .source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = InputKind::from_file_name(&file_name)
        .with_context(|| format!("'{file_name}' is neither a .tex nor a .zip file"))?;

    let size = tokio::fs::metadata(&request.source)
        .await
        .context("failed to stat source file")?
        .len();
    if size > config.max_upload_bytes {
        anyhow::bail!(
            "'{}' is {size} bytes, above the {} byte limit",
            request.source.display(),
            config.max_upload_bytes
        );
    }

    let bytes = tokio::fs::read(&request.source)
        .await
        .context("failed to read source file")?;

    let runner = Runner::new(config);
    let mut options = runner.default_options();
    if let Some(engine) = request.engine {
        options = options.with_engine(engine);
    }
    if let Some(passes) = request.passes {
        options = options.with_passes(passes);
    }
    if let Some(entry) = request.entry {
        options = options.with_entry_file(entry);
    }
    if let Some(timeout) = request.timeout {
        options = options.with_timeout_seconds(timeout);
    }

    info!(kind = ?kind, engine = %options.engine, passes = options.passes, "compiling");
    let compilation = runner.compile(CompileInput::new(kind, bytes), options).await;

    let output = request
        .output
        .unwrap_or_else(|| request.source.with_extension("pdf"));
    if let Some(pdf) = compilation
        .artifact_bytes()
        .await
        .context("failed to read compiled PDF")?
    {
        tokio::fs::write(&output, pdf)
            .await
            .context("failed to write PDF")?;
    }

    let result = compilation
        .close()
        .context("failed to remove working area")?;
    if request.json {
        print_json(&result, &output)?;
    } else {
        print_summary(&result, &output);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Arguments of the validate command
struct ValidateRequest {
    source: PathBuf,
    engine: Option<String>,
    passes: Option<u32>,
    timeout: Option<u64>,
    json: bool,
}

async fn run_validate(config: Config, request: ValidateRequest) -> Result<()> {
    let size = tokio::fs::metadata(&request.source)
        .await
        .context("failed to stat source file")?
        .len();
    if size > config.max_upload_bytes {
        anyhow::bail!(
            "'{}' is {size} bytes, above the {} byte limit",
            request.source.display(),
            config.max_upload_bytes
        );
    }
    let bytes = tokio::fs::read(&request.source)
        .await
        .context("failed to read source file")?;
    let source = String::from_utf8_lossy(&bytes);

    let runner = Runner::new(config);
    let mut options = runner.validation_options();
    if let Some(engine) = request.engine {
        options = options.with_engine(engine);
    }
    if let Some(passes) = request.passes {
        options = options.with_passes(passes);
    }
    if let Some(timeout) = request.timeout {
        options = options.with_timeout_seconds(timeout);
    }

    info!(engine = %options.engine, passes = options.passes, "validating");
    let report = runner
        .validate_source(&source, options)
        .await
        .context("failed to validate source")?;

    if request.json {
        let text = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{text}");
    } else {
        print_report(&report);
    }

    if !report.compilable {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    if report.compilable {
        println!("Document compiles");
    } else {
        println!("Document does not compile");
    }
    println!("Time: {:.3}s", report.compile_time_ms as f64 / 1000.0);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }
}

fn print_json(result: &CompileResult, output: &Path) -> Result<()> {
    let mut body = serde_json::to_value(result).context("failed to serialize result")?;
    if result.success {
        // The working area is gone; point at the copy that survives.
        body["artifact_path"] = serde_json::Value::from(output.to_string_lossy().into_owned());
    }
    let text = serde_json::to_string_pretty(&body).context("failed to serialize result")?;
    println!("{text}");
    Ok(())
}

fn print_summary(result: &CompileResult, output: &Path) {
    if result.success {
        println!("Compilation successful");
        println!("Output: {}", output.display());
    } else {
        println!(
            "Compilation failed: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
        if !result.log.is_empty() {
            println!("\nLog:\n{}", result.log);
        }
    }
    println!("Time: {:.3}s", result.elapsed_ms as f64 / 1000.0);
    println!("Passes: {}", result.passes_run);

    for warning in &result.warnings {
        println!("warning: {warning}");
    }
    for error in &result.errors {
        println!("error: {error}");
    }
}

fn list_engines(config: &Config) {
    println!("Available engines:\n");

    let mut engines: Vec<_> = config.engines.iter().collect();
    engines.sort_by_key(|(id, _)| *id);

    for (id, engine) in engines {
        let location = match engine.resolve_program() {
            Some(path) => path.display().to_string(),
            None => "missing".to_string(),
        };
        println!("  {:<15} {} ({}) [{}]", id, engine.name, engine.program, location);
    }
}

fn print_health(config: &Config) -> Result<()> {
    let engines: serde_json::Map<String, serde_json::Value> = config
        .engines
        .iter()
        .map(|(id, engine)| (id.clone(), serde_json::Value::from(engine.is_available())))
        .collect();
    let tex_available = config
        .engines
        .get(DEFAULT_ENGINE)
        .is_some_and(|engine| engine.is_available());

    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "tex_available": tex_available,
        "engines": engines,
    });
    let text = serde_json::to_string_pretty(&body).context("failed to serialize status")?;
    println!("{text}");
    Ok(())
}

fn show_config(config: &Config) {
    println!("Defaults:");
    println!("  Timeout: {}s per pass", config.default_timeout_seconds);
    println!("  Passes: {}", config.default_passes);
    println!("  Max passes: {}", config.max_passes);
    println!();
    println!("Limits:");
    println!("  Upload: {} bytes", config.max_upload_bytes);
    println!("  Extracted: {} bytes", config.max_extracted_bytes);
    println!("  Log: {} bytes", config.log_limit_bytes);
    println!();
    println!("Engines configured: {}", config.engines.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
