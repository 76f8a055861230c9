//! CLI binary for url2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to `RenderConfig`,
//! prepares the output directory, and prints the batch summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url2pdf::{
    build_jobs, read_url_file, run_batch, BatchProgressCallback, BatchSummary, ConversionJob,
    ConversionOutcome, ProgressCallback, RenderConfig,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// `{wide_msg}` shows the URL most recently started.
const PROGRESS_TEMPLATE: &str = "{spinner:.cyan} {prefix:.bold}  \
     [{bar:42.green/238}] {pos:>3}/{len} URLs  \
     ⏱ {elapsed_precise}  ETA {eta_precise}  {wide_msg:.dim}";

/// Terminal progress callback: a live bar plus one status line per finished
/// URL. Jobs finish out of order, so every line names its URL.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start
        bar.set_style(
            ProgressStyle::with_template(PROGRESS_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Processing URLs");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_jobs: usize) {
        self.bar.set_length(total_jobs as u64);
        self.bar.reset_eta();
    }

    fn on_job_start(&self, job: &ConversionJob) {
        self.bar.set_message(job.url.clone());
    }

    fn on_job_complete(&self, outcome: &ConversionOutcome) {
        self.bar.println(format!(
            "  {} {}  →  {}  {}",
            green("✓"),
            outcome.url,
            outcome.output_path.display(),
            dim(&format!("{:.1}s", outcome.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_job_error(&self, outcome: &ConversionOutcome) {
        let error = outcome.error.as_deref().unwrap_or("unknown error");
        // Keep the per-job line short; the full text is in the summary.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            outcome.url,
            red(&msg),
            dim(&format!("{:.1}s", outcome.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every URL in urls.txt into ./output_pdfs
  url2pdf urls.txt

  # Custom output directory, 8 parallel jobs
  url2pdf urls.txt -o pdfs -j 8

  # Pages with heavy MathJax: wait 20 s before printing
  url2pdf urls.txt -d 20000

  # Keep WebP images untouched, smaller JPEGs otherwise
  url2pdf urls.txt --no-webp-convert
  url2pdf urls.txt --image-quality 60

  # Machine-readable summary
  url2pdf urls.txt --json > summary.json

INPUT FORMAT:
  One URL per line. Leading/trailing whitespace and blank lines are ignored.

OUTPUT NAMES:
  https://example.com:8080/a/b/c  →  example_com_8080_a_b_c.pdf
  https://example.com/            →  example_com_page_<n>.pdf
  <unparseable>                   →  page_<n>.pdf

REQUIREMENTS:
  wkhtmltopdf must be on PATH (or pass --renderer /path/to/wkhtmltopdf).
"#;

/// Convert web pages to PDF with math formula support.
#[derive(Parser, Debug)]
#[command(
    name = "url2pdf",
    version,
    about = "Convert web pages to PDF with math formula support",
    long_about = "Convert a list of web pages to PDF using wkhtmltopdf. Each page gets a <base> \
tag and the MathJax loader injected, and WebP images are re-encoded as inline JPEG so the \
renderer can display them.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Text file containing URLs (one per line).
    url_file: PathBuf,

    /// Output directory for PDF files.
    #[arg(short, long, env = "URL2PDF_OUTPUT_DIR", default_value = "output_pdfs")]
    output_dir: PathBuf,

    /// JavaScript delay in milliseconds.
    #[arg(short, long, env = "URL2PDF_DELAY", default_value_t = 10_000)]
    delay: u64,

    /// Number of parallel jobs.
    #[arg(short, long, env = "URL2PDF_JOBS", default_value_t = 4,
          value_parser = clap::value_parser!(u64).range(1..))]
    jobs: u64,

    /// Disable WebP to JPEG conversion.
    #[arg(long = "no-webp-convert", env = "URL2PDF_NO_WEBP_CONVERT")]
    no_webp_convert: bool,

    /// Quality for converted JPEG images (1-100).
    #[arg(long, env = "URL2PDF_IMAGE_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    image_quality: u8,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "URL2PDF_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Extra attempts after a failed page download.
    #[arg(long, env = "URL2PDF_RETRIES", default_value_t = 2)]
    retries: u32,

    /// Largest image (bytes) that will be downloaded for conversion.
    #[arg(long, env = "URL2PDF_MAX_IMAGE_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_image_size: u64,

    /// User-Agent header for page and image requests.
    #[arg(long, env = "URL2PDF_USER_AGENT")]
    user_agent: Option<String>,

    /// Renderer executable.
    #[arg(long, env = "URL2PDF_RENDERER", default_value = "wkhtmltopdf")]
    renderer: PathBuf,

    /// Kill the renderer after this many seconds.
    #[arg(long, env = "URL2PDF_RENDER_TIMEOUT")]
    render_timeout: Option<u64>,

    /// Print the summary as JSON on stdout.
    #[arg(long, env = "URL2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "URL2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "URL2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "URL2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar prints a line per URL; library INFO logs would only
    // duplicate it.
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

    // ── Startup: output dir + URL list ───────────────────────────────────
    tokio::fs::create_dir_all(&cli.output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", cli.output_dir))?;

    let urls = read_url_file(&cli.url_file).await?;
    let jobs = build_jobs(&urls, &cli.output_dir);

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run batch ────────────────────────────────────────────────────────
    let summary = run_batch(jobs, &config)
        .await
        .context("Batch could not start")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&summary);
    }

    Ok(())
}

/// Map CLI args to `RenderConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RenderConfig> {
    let mut builder = RenderConfig::builder()
        .javascript_delay_ms(cli.delay)
        .max_workers(cli.jobs as usize)
        .convert_source_image_format(!cli.no_webp_convert)
        .target_image_quality(cli.image_quality)
        .timeout_secs(cli.timeout)
        .retry_attempts(cli.retries)
        .max_image_bytes(cli.max_image_size)
        .renderer_program(cli.renderer.clone())
        .render_timeout_secs(cli.render_timeout);

    if let Some(ref ua) = cli.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(summary: &BatchSummary) {
    eprintln!();
    eprintln!("{}", bold("Conversion Summary:"));
    eprintln!(
        "  {} Successfully converted: {}",
        green("✔"),
        bold(&summary.success_count.to_string())
    );
    eprintln!(
        "  {} Failed conversions:     {}",
        if summary.failure_count == 0 {
            cyan("•")
        } else {
            red("✘")
        },
        bold(&summary.failure_count.to_string())
    );
    eprintln!(
        "  {}",
        dim(&format!("{:.1}s total", summary.total_duration_ms as f64 / 1000.0))
    );

    if !summary.failures.is_empty() {
        eprintln!();
        eprintln!("{}", bold("Failed URLs:"));
        for failure in &summary.failures {
            eprintln!("  - {}: {}", failure.url, red(&failure.error));
        }
    }
}
