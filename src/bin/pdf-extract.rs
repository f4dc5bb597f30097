//! CLI binary for drawing-extract.
//!
//! A thin shim over the library: a folder runs as a batch, a single PDF runs
//! as a batch of one. Either way one `PDF_XML_<folder>.xml` is written.

use anyhow::{Context, Result};
use clap::Parser;
use drawing_extract::{
    extract_batch, extract_folder, BatchConfig, BatchOutput, BatchProgressCallback,
    CustomerDetection, ProgressCallback, RetryAttempt,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar over the files of a batch, with one log line per event.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading drawings…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn truncate(msg: &str) -> String {
        if msg.chars().count() > 80 {
            let cut: String = msg.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            msg.to_string()
        }
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_files as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Batch of {total_files} drawing(s)"))
        ));
    }

    fn on_customer(&self, detection: &CustomerDetection) {
        self.bar.println(format!(
            "  {} customer {}  {}",
            cyan("●"),
            bold(&detection.customer_id),
            dim(&format!("({}: {})", detection.confidence, detection.reason)),
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, file: &str) {
        self.bar.set_message(file.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, file: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            file
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, file: &str, error: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            file,
            red(&Self::truncate(error)),
        ));
        self.bar.inc(1);
    }

    fn on_retry(&self, file: &str, attempt: &RetryAttempt<'_>) {
        self.bar.println(format!(
            "  {} {}  attempt {}/{} failed, retrying in {:.1}s  {}",
            yellow("↻"),
            file,
            attempt.attempt + 1,
            attempt.max_attempts,
            attempt.delay.as_secs_f64(),
            dim(&Self::truncate(&attempt.error.to_string())),
        ));
    }

    fn on_cooldown(&self, consecutive_failures: usize, cooldown: Duration) {
        self.bar.println(format!(
            "  {} {} failures in a row, pausing {}s to let the API recover",
            yellow("⏸"),
            consecutive_failures,
            cooldown.as_secs()
        ));
    }

    fn on_assembly(&self, part_number: &str) {
        self.bar.println(format!("  {} assembly {}", cyan("▣"), bold(part_number)));
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} drawing(s) extracted",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {} extracted  ({} failed)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Batch: every PDF in the order folder, customer detected automatically
  pdf-extract orders/20260001/

  # Fixed customer, XML into another folder
  pdf-extract orders/20260001/ --customer elten -o out/

  # Single drawing
  pdf-extract orders/20260001/10009081.pdf -c rademaker

  # Print the result as JSON as well
  pdf-extract orders/20260001/ --json > result.json

OUTPUT:
  PDF_XML_<folder>.xml, written next to the PDFs unless --output is given.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  VITE_GEMINI_API_KEY     Fallback for GEMINI_API_KEY
  PDF_EXTRACT_*           Defaults for the flags below
  RUST_LOG                Log filter (overrides --verbose/--quiet)

A .env file in the working directory is loaded on start.
"#;

/// Extract holes, tolerances, material and surface treatment from
/// technical-drawing PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-extract",
    version,
    about = "Extract manufacturing data from technical-drawing PDFs with a multimodal LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// A PDF file or a folder of PDFs.
    path: PathBuf,

    /// Customer id (elten, rademaker, base) or "auto".
    #[arg(short, long, env = "PDF_EXTRACT_CUSTOMER", default_value = "auto")]
    customer: String,

    /// Directory for the XML file. Default: the input folder.
    #[arg(short, long, env = "PDF_EXTRACT_OUTPUT")]
    output: Option<PathBuf>,

    /// Model id.
    #[arg(short, long, env = "PDF_EXTRACT_MODEL", default_value = "gemini-2.5-pro")]
    model: String,

    /// Provider name for edgequake-llm.
    #[arg(long, env = "PDF_EXTRACT_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Root of the customer YAML configuration.
    #[arg(long, env = "PDF_EXTRACT_CONFIG_ROOT")]
    config_root: Option<PathBuf>,

    /// Retries per file on 503/429/overloaded.
    #[arg(long, env = "PDF_EXTRACT_MAX_RETRIES", default_value_t = 7)]
    max_retries: u32,

    /// Print the batch result as JSON on stdout.
    #[arg(long, env = "PDF_EXTRACT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_EXTRACT_QUIET")]
    quiet: bool,
}

/// Gemini reads `GEMINI_API_KEY`; accept the front-end's variable as well.
fn promote_vite_key() {
    let missing = std::env::var("GEMINI_API_KEY").map(|k| k.is_empty()).unwrap_or(true);
    if missing {
        if let Ok(key) = std::env::var("VITE_GEMINI_API_KEY") {
            if !key.is_empty() {
                std::env::set_var("GEMINI_API_KEY", key);
            }
        }
    }
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .customer(&cli.customer)
        .model(&cli.model)
        .provider_name(&cli.provider)
        .max_retries(cli.max_retries);
    if let Some(ref dir) = cli.output {
        builder = builder.output_dir(dir);
    }
    if let Some(ref root) = cli.config_root {
        builder = builder.config_root(root);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn print_summary(output: &BatchOutput, quiet: bool) {
    if quiet {
        return;
    }
    let r = &output.result;
    for failure in &r.failures {
        eprintln!("  {} {}", red("✗"), failure);
    }
    if let Some(ref assembly) = r.assembly {
        eprintln!("   assembly: {}", bold(assembly));
    }
    eprintln!(
        "{}  {} ok / {} failed  →  {}",
        if r.failed == 0 { green("✔") } else { cyan("⚠") },
        r.succeeded,
        r.failed,
        bold(&output.xml_path.display().to_string()),
    );
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    let single_file = cli.path.is_file();
    let output = if single_file {
        extract_batch(std::slice::from_ref(&cli.path), &config)
            .await
            .with_context(|| format!("Extraction of {} failed", cli.path.display()))?
    } else {
        extract_folder(&cli.path, &config)
            .await
            .with_context(|| format!("Batch extraction of {} failed", cli.path.display()))?
    };

    if cli.json {
        let json =
            serde_json::to_string_pretty(&output.result).context("Failed to serialise output")?;
        println!("{json}");
    }
    print_summary(&output, cli.quiet);

    // A lone drawing that failed is a failed run; a batch still produced
    // its best-effort XML.
    if single_file && output.result.succeeded == 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    promote_vite_key();
    run(cli).await
}
