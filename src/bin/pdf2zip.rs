//! CLI binary for edgequake-pdf2zip.
//!
//! A thin shim over the library crate: `run` maps flags to `BatchConfig`
//! and drives the batch, `convert` is the isolated worker entry point, and
//! `list` / `show` inspect an archive.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2zip::{
    convert_pdf, process, ArchiveCache, BackendConfig, BatchConfig, BatchProgressCallback,
    BatchReport, BatchStats, HttpFetcher, InProcessConverter, IsolatedConverter, Method,
    OutputFormat, ProgressCallback, RowStatus, Table, WorkerCommand,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over the pending rows plus a log line per row.
struct CliProgressCallback {
    bar: ProgressBar,
    row_started: Mutex<Option<Instant>>,
    cache_hits: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Planning");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            row_started: Mutex::new(None),
            cache_hits: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .row_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_rows: usize, pending: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>4}/{len} rows  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(pending as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {} rows, {} to convert",
            bold("◆"),
            total_rows,
            bold(&pending.to_string())
        ));
    }

    fn on_cache_hit(&self, _name: &str) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn on_row_start(&self, _position: usize, _pending: usize, name: &str) {
        if let Ok(mut t) = self.row_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_row_converted(&self, name: &str, text_len: usize) {
        self.bar.println(format!(
            "  {} {:<40} {}  {}",
            green("✓"),
            name,
            dim(&format!("{text_len:>8} bytes")),
            self.elapsed()
        ));
        self.bar.inc(1);
    }

    fn on_row_empty(&self, name: &str) {
        self.bar.println(format!(
            "  {} {:<40} {}  {}",
            yellow("∅"),
            name,
            yellow("no text"),
            self.elapsed()
        ));
        self.bar.inc(1);
    }

    fn on_row_error(&self, name: &str, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}…", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<40} {}  {}",
            red("✗"),
            name,
            red(&msg),
            self.elapsed()
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.bar.finish_and_clear();
        eprintln!("{}", summary_line(stats));
        let hits = self.cache_hits.load(Ordering::Relaxed);
        if hits > 0 {
            eprintln!("   {}", dim(&format!("{hits} rows served from the archive")));
        }
    }
}

fn summary_line(stats: &BatchStats) -> String {
    let mark = if stats.failed == 0 { green("✔") } else { yellow("⚠") };
    format!(
        "{}  {} converted  {} cached  {} empty  {} failed  {} invalid  {} duplicate  {}ms",
        mark,
        bold(&stats.converted.to_string()),
        stats.cache_hits,
        stats.empty,
        if stats.failed > 0 {
            red(&stats.failed.to_string())
        } else {
            stats.failed.to_string()
        },
        stats.invalid,
        stats.duplicates,
        stats.duration_ms,
    )
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every PDF in papers.csv into papers.zip (Markdown, pdfium heuristic)
  pdf2zip run papers.csv --url-column pdf_url --name-column doi --archive papers.zip

  # Plain text, merged back into the table, snapshot after every row
  pdf2zip run papers.csv --format txt --merge-output --snapshot papers.out.csv

  # Remote OCR through docling-serve
  DOCLING_HTTP_CLIENT=http://docling:5001 DOCLING_API_KEY=... \
    pdf2zip run papers.csv --method docling-serve

  # Inspect the cache
  pdf2zip list papers.zip
  pdf2zip show papers.zip 10.1000_182_pdfium.md

METHODS:
  pdfium, heuristic   Markdown from the PDF text layer (headings by font size)
  text, plain         Plain page text
  docling-serve       Remote OCR via docling-serve
  <anything else>     Default backend for the format; the label still names entries

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH       pdfium shared library (file or directory)
  DOCLING_HTTP_CLIENT   docling-serve base URL
  DOCLING_API_KEY       docling-serve bearer token
  DOCLING_OCR_ENGINE    easyocr | tesseract | rapidocr
  DOCLING_OCR_LANG      Comma-separated OCR languages (default en,fr,de,it)
  DOCLING_TABLE_MODE    fast | accurate
  DOCLING_PAGE_RANGE    e.g. 1-10
  DOCLING_PDF_BACKEND   Server-side PDF parser (default pypdfium2)
  DOCLING_DOCUMENT_TIMEOUT  Server-side per-document limit in seconds (default 3600)
  DOCLING_REQUEST_TIMEOUT   HTTP request limit in seconds (default 120)
"#;

/// Batch-convert PDFs listed in a CSV table into a ZIP archive.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2zip",
    version,
    about = "Batch-convert PDFs referenced in a CSV table to Markdown/text, cached in a ZIP archive",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2ZIP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2ZIP_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert every row of a CSV table, skipping rows already in the archive
    Run(RunArgs),

    /// Convert one local PDF and print the result on stdout (worker mode)
    Convert(ConvertArgs),

    /// List the entries of an archive
    List {
        /// Archive to inspect
        archive: PathBuf,
    },

    /// Print one archive entry on stdout
    Show {
        /// Archive to read
        archive: PathBuf,
        /// Entry name, e.g. doc1_pdfium.md
        name: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input CSV file with a header row.
    input: PathBuf,

    /// Column holding the PDF URLs.
    #[arg(long, env = "PDF2ZIP_URL_COLUMN", default_value = "url")]
    url_column: String,

    /// Column whose value names the archive entry.
    #[arg(long, env = "PDF2ZIP_NAME_COLUMN", default_value = "name")]
    name_column: String,

    /// Conversion method label (see METHODS).
    #[arg(short, long, env = "PDF2ZIP_METHOD", default_value = "pdfium")]
    method: String,

    /// Output format: md or txt.
    #[arg(short, long, env = "PDF2ZIP_FORMAT", default_value = "md")]
    format: OutputFormat,

    /// ZIP archive used as the conversion cache.
    #[arg(short, long, env = "PDF2ZIP_ARCHIVE", default_value = "conversions.zip")]
    archive: PathBuf,

    /// Column receiving the converted text (default: <url>_<md|txt>_<method>).
    #[arg(long, env = "PDF2ZIP_OUTPUT_COLUMN")]
    output_column: Option<String>,

    /// Copy converted and cached text into the table.
    #[arg(long, env = "PDF2ZIP_MERGE_OUTPUT")]
    merge_output: bool,

    /// Write the updated table to this CSV when the batch finishes.
    #[arg(short, long, env = "PDF2ZIP_OUTPUT")]
    output: Option<PathBuf>,

    /// Write the table to this CSV after every processed row.
    #[arg(long, env = "PDF2ZIP_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Re-convert rows even when the archive already holds them.
    #[arg(long, env = "PDF2ZIP_FORCE_REPLACE")]
    force_replace: bool,

    /// Convert inside this process instead of a worker subprocess.
    #[arg(long, env = "PDF2ZIP_NO_ISOLATION")]
    no_isolation: bool,

    /// Per-conversion wall-clock limit in seconds.
    #[arg(long, env = "PDF2ZIP_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2ZIP_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Directory for downloaded PDFs (default: a temporary directory).
    #[arg(long, env = "PDF2ZIP_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Print the per-row report as JSON on stdout.
    #[arg(long, env = "PDF2ZIP_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2ZIP_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local PDF file.
    input: PathBuf,

    /// Conversion method label.
    method: String,

    /// Output format: md or txt.
    #[arg(short, long, default_value = "md")]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs in an interactive run; a worker
    // keeps warnings only, since its stderr ends up in error reports.
    let show_progress = match cli.command {
        Command::Run(ref args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else if matches!(cli.command, Command::Convert(_)) {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => run(args, show_progress, cli.quiet).await,
        Command::Convert(args) => convert_one(args).await,
        Command::List { archive } => list(archive),
        Command::Show { archive, name } => show(archive, &name),
    }
}

async fn run(args: RunArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let table = Table::read_csv(&args.input).context("Failed to load input table")?;
    let method = Method::resolve(&args.method, args.format);

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&args, method, progress_cb)?;

    let fetcher = HttpFetcher::new().context("Failed to build HTTP client")?;
    let backend = BackendConfig::from_env();

    // ── Run batch ────────────────────────────────────────────────────────
    let result = if args.no_isolation {
        let converter = InProcessConverter::new(backend);
        process(table, &config, &fetcher, &converter).await
    } else {
        let worker = WorkerCommand::current_exe().context("Failed to locate worker binary")?;
        let converter = IsolatedConverter::new(worker, backend);
        process(table, &config, &fetcher, &converter).await
    };
    let report = result.context("Batch failed")?;

    if let Some(ref path) = args.output {
        report
            .table
            .write_csv_atomic(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !quiet && !show_progress {
        print_report(&report);
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(
    args: &RunArgs,
    method: Method,
    progress: Option<ProgressCallback>,
) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .url_column(&args.url_column)
        .name_column(&args.name_column)
        .method(method)
        .archive_path(&args.archive)
        .merge_output(args.merge_output)
        .force_replace(args.force_replace)
        .download_timeout_secs(args.download_timeout)
        .convert_timeout_secs(args.timeout);

    if let Some(ref col) = args.output_column {
        builder = builder.output_column(col);
    }
    if let Some(ref path) = args.snapshot {
        builder = builder.snapshot_path(path);
    }
    if let Some(ref dir) = args.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_report(report: &BatchReport) {
    for outcome in &report.outcomes {
        let name = outcome.target_name.as_deref().unwrap_or("-");
        match outcome.status {
            RowStatus::Failed { ref error } => {
                eprintln!("  {} row {:>4}  {}  {}", red("✗"), outcome.row_index, name, error)
            }
            RowStatus::Invalid { ref reason } => {
                eprintln!("  {} row {:>4}  {}", dim("·"), outcome.row_index, dim(reason))
            }
            RowStatus::Empty => {
                eprintln!("  {} row {:>4}  {}  no text", yellow("∅"), outcome.row_index, name)
            }
            _ => {}
        }
    }
    eprintln!("{}", summary_line(&report.stats));
}

/// Worker mode: text on stdout, diagnostics on stderr, non-zero exit on failure.
async fn convert_one(args: ConvertArgs) -> Result<()> {
    let method = Method::resolve(&args.method, args.format);
    let backend = BackendConfig::from_env();
    backend.check(&method)?;

    let text = convert_pdf(&args.input, &method, &backend)
        .await
        .with_context(|| format!("Conversion of {} failed", args.input.display()))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    handle.flush().context("Failed to write to stdout")?;
    Ok(())
}

fn list(archive: PathBuf) -> Result<()> {
    if !archive.exists() {
        anyhow::bail!("Archive not found: {}", archive.display());
    }
    let cache = ArchiveCache::ensure(&archive).context("Failed to open archive")?;
    for name in cache.names() {
        println!("{name}");
    }
    eprintln!("{}", dim(&format!("{} entries", cache.len())));
    Ok(())
}

fn show(archive: PathBuf, name: &str) -> Result<()> {
    if !archive.exists() {
        anyhow::bail!("Archive not found: {}", archive.display());
    }
    let cache = ArchiveCache::ensure(&archive).context("Failed to open archive")?;
    let text = cache
        .read_to_string(name)
        .with_context(|| format!("Failed to read '{name}'"))?;
    print!("{text}");
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}
