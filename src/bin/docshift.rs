//! CLI binary for docshift.
//!
//! A thin shim over the library crate that maps CLI flags to `EngineConfig`,
//! runs one conversion (or a capability listing, or a retention sweep) and
//! prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use docshift::pipeline::input::extension_of;
use docshift::{
    cleanup, AdapterError, BackendDescriptor, ConversionEngine, DispatchObserver, EngineConfig, PriorityClass,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Spinner observer ─────────────────────────────────────────────────────────

/// Shows the backend currently being tried and logs each failed attempt
/// above the spinner.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.set_message("Preparing…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl DispatchObserver for CliObserver {
    fn on_dispatch_start(&self, input_extension: &str, output_format: &str, candidates: &[BackendDescriptor]) {
        self.bar.set_prefix(format!("{input_extension} → {output_format}"));
        if candidates.is_empty() {
            self.bar.set_message("no backend available");
        }
    }

    fn on_attempt_start(&self, backend: &BackendDescriptor) {
        self.bar.set_message(format!("trying {}", backend.name));
    }

    fn on_attempt_failed(&self, backend: &BackendDescriptor, error: &AdapterError) {
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            bold(&backend.name),
            dim(&format!("{}: {}", error.kind, error.message))
        ));
    }

    fn on_class_skipped(&self, class: PriorityClass, hint: &str) {
        self.bar
            .println(format!("  {} {}", dim(&format!("skipped {class}:")), dim(hint)));
    }

    fn on_dispatch_complete(&self, _backend: &BackendDescriptor, _output: &Path) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a document (result lands in the output directory)
  docshift report.docx --to pdf

  # Copy the result somewhere specific
  docshift notes.txt --to html -o notes.html

  # What can this machine convert?
  docshift --capabilities
  docshift --capabilities --json

  # Remove uploads and outputs older than the retention window
  docshift --sweep

ENVIRONMENT VARIABLES:
  DOCSHIFT_UPLOAD_DIR       Staging directory for uploads
  DOCSHIFT_OUTPUT_DIR       Directory receiving converted files
  DOCSHIFT_OFFICE_BINARY    Path to soffice/libreoffice
  DOCSHIFT_WKHTMLTOPDF      Path to wkhtmltopdf
  PDFIUM_LIB_PATH           Path to an existing libpdfium
  CLOUDCONVERT_API_KEY      Enables the CloudConvert fallback

OPTIONAL ENGINES:
  LibreOffice   legacy and ODF formats, office documents to PDF and HTML
  wkhtmltopdf   HTML to PDF
  pdfium        PDF to text, images, Word and PowerPoint
  CloudConvert  anything else a local backend recognises
"#;

/// Convert documents between formats.
#[derive(Parser, Debug)]
#[command(
    name = "docshift",
    version,
    about = "Convert documents, spreadsheets, presentations and images between formats",
    long_about = "Convert files between formats by trying built-in transcoders first, then a \
headless LibreOffice, then the CloudConvert API. Every output is checked before it is returned.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// File to convert.
    input: Option<PathBuf>,

    /// Target format (pdf, docx, html, png, ...).
    #[arg(short, long = "to", env = "DOCSHIFT_TO")]
    to: Option<String>,

    /// Copy the converted file to this path.
    #[arg(short, long, env = "DOCSHIFT_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the conversions this machine supports and exit.
    #[arg(long)]
    capabilities: bool,

    /// Machine-readable output (capabilities or conversion result).
    #[arg(long, env = "DOCSHIFT_JSON")]
    json: bool,

    /// Run one retention sweep over the upload and output directories.
    #[arg(long)]
    sweep: bool,

    /// Staging directory for uploads.
    #[arg(long, env = "DOCSHIFT_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Directory receiving converted files.
    #[arg(long, env = "DOCSHIFT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Office-suite executable.
    #[arg(long, env = "DOCSHIFT_OFFICE_BINARY")]
    office_binary: Option<PathBuf>,

    /// wkhtmltopdf executable.
    #[arg(long, env = "DOCSHIFT_WKHTMLTOPDF")]
    wkhtmltopdf: Option<PathBuf>,

    /// pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// CloudConvert API key.
    #[arg(long, env = "CLOUDCONVERT_API_KEY", hide_env_values = true)]
    cloud_api_key: Option<String>,

    /// Office-suite timeout in seconds (5–3600).
    #[arg(long, env = "DOCSHIFT_OFFICE_TIMEOUT", default_value_t = 90)]
    office_timeout: u64,

    /// Retention window for --sweep, in hours.
    #[arg(long, env = "DOCSHIFT_RETENTION_HOURS", default_value_t = 24)]
    retention_hours: u64,

    /// Disable the spinner.
    #[arg(long, env = "DOCSHIFT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCSHIFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCSHIFT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback that matters; keep library INFO logs
    // out of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.capabilities && !cli.sweep;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let observer = show_progress.then(CliObserver::new);
    let config = build_config(&cli, observer.clone())?;

    // ── Sweep mode ───────────────────────────────────────────────────────
    if cli.sweep {
        let dirs = [config.upload_dir.clone(), config.output_dir.clone()];
        let removed = cleanup::sweep_all(&dirs, config.retention());
        if !cli.quiet {
            eprintln!("{}  removed {} files older than {}h", green("✔"), removed, cli.retention_hours);
        }
        return Ok(());
    }

    let engine = ConversionEngine::new(config);

    // ── Capabilities mode ────────────────────────────────────────────────
    if cli.capabilities {
        let caps = engine.get_capabilities();
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&caps).context("Failed to serialise capabilities")?
            );
        } else {
            println!("{}", bold("Engines:"));
            if caps.available_engines.is_empty() {
                println!("  {}", dim("none (built-in transcoders only)"));
            }
            for e in &caps.available_engines {
                println!("  {e}");
            }
            println!("{}", bold("Conversions:"));
            for pair in &caps.supported_conversions {
                println!("  {}", pair.replace("_to_", " → "));
            }
            println!(
                "{} {}",
                bold("Cloud fallback:"),
                if caps.cloud_fallback { "yes" } else { "no" }
            );
        }
        return Ok(());
    }

    // ── Convert ──────────────────────────────────────────────────────────
    let input = cli.input.as_deref().context("INPUT is required (or use --capabilities / --sweep)")?;
    let to = cli.to.as_deref().context("--to <FORMAT> is required")?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension_of(&name);

    let result = engine.convert_file(input, &extension, to, &name).await;
    if let Some(obs) = &observer {
        obs.bar.finish_and_clear();
    }
    let output = result.with_context(|| format!("Conversion of {} failed", input.display()))?;

    let final_path = match &cli.output {
        Some(dest) => {
            if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::copy(&output.output_path, dest)
                .await
                .with_context(|| format!("Failed to copy result to {}", dest.display()))?;
            dest.clone()
        }
        None => output.output_path.clone(),
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}  via {}  {}ms",
            green("✔"),
            bold(&final_path.display().to_string()),
            output.backend,
            output.duration_ms,
        );
    }
    Ok(())
}

/// Map CLI args to `EngineConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<EngineConfig> {
    let mut builder = EngineConfig::builder()
        .office_timeout_secs(cli.office_timeout)
        .retention_hours(cli.retention_hours);

    if let Some(dir) = &cli.upload_dir {
        builder = builder.upload_dir(dir);
    }
    if let Some(dir) = &cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(p) = &cli.office_binary {
        builder = builder.office_binary(p);
    }
    if let Some(p) = &cli.wkhtmltopdf {
        builder = builder.html_renderer_binary(p);
    }
    if let Some(p) = &cli.pdfium_lib {
        builder = builder.pdfium_library(p);
    }
    if let Some(key) = &cli.cloud_api_key {
        builder = builder.cloud_api_key(key);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }
    builder.build().context("Invalid configuration")
}
