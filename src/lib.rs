//! # edgequake-pdf2zip
//!
//! Batch-convert PDFs referenced in a CSV table to Markdown or plain text,
//! caching every result in a single ZIP archive.
//!
//! Each row names a PDF URL and a key. The key plus the method label gives
//! the archive entry name (`<key>_<method>.md`). Rows whose entry already
//! exists are skipped, so re-running a batch only does the work that is
//! missing. Conversions can run in a child process with a timeout, so a PDF
//! that crashes or hangs the extractor costs one row, not the batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CSV table
//!  │
//!  ├─ 1. Plan     entry name per row; drop invalid, duplicate and cached rows
//!  ├─ 2. Fetch    stream the PDF to a scratch directory (bounded timeout)
//!  ├─ 3. Convert  pdfium heuristic / plain text / docling-serve, isolated
//!  ├─ 4. Store    rebuild the ZIP with the new entry, atomic rename
//!  └─ 5. Report   per-row outcome, optional CSV snapshot after each row
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2zip::{
//!     process, BackendConfig, BatchConfig, HttpFetcher, InProcessConverter, Table,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let table = Table::read_csv("papers.csv")?;
//!     let config = BatchConfig::builder()
//!         .url_column("pdf_url")
//!         .name_column("doi")
//!         .archive_path("papers.zip")
//!         .build()?;
//!
//!     let fetcher = HttpFetcher::new()?;
//!     let converter = InProcessConverter::new(BackendConfig::from_env());
//!     let report = process(table, &config, &fetcher, &converter).await?;
//!     eprintln!(
//!         "{} converted, {} cached, {} failed",
//!         report.stats.converted, report.stats.cache_hits, report.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2zip` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2zip = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod fetch;
pub mod isolate;
pub mod method;
pub mod naming;
pub mod progress;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::ArchiveCache;
pub use backend::{convert_pdf, Converter, InProcessConverter};
pub use batch::{prepare_work_dir, process, BatchReport, BatchStats, RowOutcome, RowStatus, WorkDir};
pub use config::{BackendConfig, BatchConfig, BatchConfigBuilder, DoclingConfig, TableMode};
pub use error::{Pdf2ZipError, RowError};
pub use fetch::{is_url, Fetcher, HttpFetcher};
pub use isolate::{run_isolated, IsolatedConverter, WorkerCommand};
pub use method::{Backend, Method, OutputFormat};
pub use naming::sanitize_key;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use table::Table;
