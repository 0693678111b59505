//! Configuration types for batch conversion.
//!
//! [`BatchConfig`] controls the orchestrator (which columns to read, where the
//! archive lives, whether to overwrite cached entries). [`BackendConfig`]
//! carries what the extraction backends need at conversion time: the pdfium
//! library location and, for the remote OCR backend, its endpoint and token.
//! Nothing is read from global state at import time; the binary builds both
//! structs from flags and environment and passes them in.

use crate::error::Pdf2ZipError;
use crate::method::{Backend, Method};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Environment variable holding the docling-serve base URL.
pub const ENV_DOCLING_URL: &str = "DOCLING_HTTP_CLIENT";
/// Environment variable holding the docling-serve bearer token.
pub const ENV_DOCLING_KEY: &str = "DOCLING_API_KEY";
/// Environment variable pointing at a pdfium shared library (file or directory).
pub const ENV_PDFIUM_LIB: &str = "PDFIUM_LIB_PATH";

const ENV_DOCLING_OCR_ENGINE: &str = "DOCLING_OCR_ENGINE";
const ENV_DOCLING_OCR_LANG: &str = "DOCLING_OCR_LANG";
const ENV_DOCLING_TABLE_MODE: &str = "DOCLING_TABLE_MODE";
const ENV_DOCLING_PAGE_RANGE: &str = "DOCLING_PAGE_RANGE";
const ENV_DOCLING_PDF_BACKEND: &str = "DOCLING_PDF_BACKEND";
const ENV_DOCLING_DOCUMENT_TIMEOUT: &str = "DOCLING_DOCUMENT_TIMEOUT";
const ENV_DOCLING_REQUEST_TIMEOUT: &str = "DOCLING_REQUEST_TIMEOUT";

/// Configuration for one batch run.
///
/// Built via [`BatchConfig::builder()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2zip::{BatchConfig, Method, OutputFormat};
///
/// let config = BatchConfig::builder()
///     .url_column("pdf_url")
///     .name_column("doc_id")
///     .method(Method::resolve("pdfium", OutputFormat::Markdown))
///     .archive_path("out/markdown.zip")
///     .build()
///     .unwrap();
/// assert!(!config.force_replace);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Column holding the PDF URL. Default: `"url"`.
    pub url_column: String,

    /// Column whose value names the archive entry. Default: `"name"`.
    pub name_column: String,

    /// Column receiving converted text when `merge_output` is on.
    /// If None, uses `<url_column>_<md|txt>_<method>`.
    pub output_column: Option<String>,

    /// Copy converted (or cached) text into the table. Default: false.
    ///
    /// Reading cached entries back costs one archive read per cache hit, so
    /// this stays off unless the caller wants the text in the table.
    pub merge_output: bool,

    /// Conversion method (label + backend + format).
    pub method: Method,

    /// ZIP archive used as the conversion cache. Default: `"conversions.zip"`.
    pub archive_path: PathBuf,

    /// Re-convert rows even when their entry already exists. Default: false.
    pub force_replace: bool,

    /// Write the table as CSV here after every processed row. Default: None.
    pub snapshot_path: Option<PathBuf>,

    /// Scratch directory for downloaded PDFs. If None, a temp dir is used.
    pub work_dir: Option<PathBuf>,

    /// Download timeout for each PDF in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Wall-clock limit for one isolated conversion in seconds. Default: 300.
    pub convert_timeout_secs: u64,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            url_column: "url".to_string(),
            name_column: "name".to_string(),
            output_column: None,
            merge_output: false,
            method: Method::default(),
            archive_path: PathBuf::from("conversions.zip"),
            force_replace: false,
            snapshot_path: None,
            work_dir: None,
            download_timeout_secs: 120,
            convert_timeout_secs: 300,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("url_column", &self.url_column)
            .field("name_column", &self.name_column)
            .field("output_column", &self.output_column)
            .field("merge_output", &self.merge_output)
            .field("method", &self.method)
            .field("archive_path", &self.archive_path)
            .field("force_replace", &self.force_replace)
            .field("snapshot_path", &self.snapshot_path)
            .field("work_dir", &self.work_dir)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("convert_timeout_secs", &self.convert_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// The column that receives converted text.
    pub fn resolved_output_column(&self) -> String {
        self.output_column
            .clone()
            .unwrap_or_else(|| self.method.default_output_column(&self.url_column))
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn url_column(mut self, column: impl Into<String>) -> Self {
        self.config.url_column = column.into();
        self
    }

    pub fn name_column(mut self, column: impl Into<String>) -> Self {
        self.config.name_column = column.into();
        self
    }

    pub fn output_column(mut self, column: impl Into<String>) -> Self {
        self.config.output_column = Some(column.into());
        self
    }

    pub fn merge_output(mut self, v: bool) -> Self {
        self.config.merge_output = v;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.config.method = method;
        self
    }

    pub fn archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.archive_path = path.into();
        self
    }

    pub fn force_replace(mut self, v: bool) -> Self {
        self.config.force_replace = v;
        self
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = Some(path.into());
        self
    }

    pub fn work_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(path.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, Pdf2ZipError> {
        let c = &self.config;
        if c.url_column.trim().is_empty() || c.name_column.trim().is_empty() {
            return Err(Pdf2ZipError::InvalidConfig(
                "URL and naming columns must be non-empty".into(),
            ));
        }
        if c.download_timeout_secs == 0 || c.convert_timeout_secs == 0 {
            return Err(Pdf2ZipError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.archive_path.as_os_str().is_empty() {
            return Err(Pdf2ZipError::InvalidConfig("Archive path is empty".into()));
        }
        if c.merge_output {
            let out = c.resolved_output_column();
            if out == c.url_column || out == c.name_column {
                return Err(Pdf2ZipError::InvalidConfig(format!(
                    "Output column '{out}' would overwrite an input column"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Backend configuration ────────────────────────────────────────────────

/// Settings the extraction backends need at conversion time.
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    /// pdfium shared library (file, or directory holding the platform
    /// library). If None, the system library search path is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Remote OCR backend settings. None when not configured.
    pub docling: Option<DoclingConfig>,
}

impl BackendConfig {
    /// Read `PDFIUM_LIB_PATH` and the `DOCLING_*` variables.
    pub fn from_env() -> Self {
        Self {
            pdfium_lib_path: non_empty_env(ENV_PDFIUM_LIB).map(PathBuf::from),
            docling: DoclingConfig::from_env(),
        }
    }

    /// Fail fast when `method` needs settings that are missing.
    pub fn check(&self, method: &Method) -> Result<(), Pdf2ZipError> {
        if method.backend() == Backend::DoclingServe {
            self.docling()?;
        }
        Ok(())
    }

    /// The docling settings, or a configuration error naming what is missing.
    pub fn docling(&self) -> Result<&DoclingConfig, Pdf2ZipError> {
        let cfg = self
            .docling
            .as_ref()
            .ok_or_else(|| Pdf2ZipError::ProviderNotConfigured {
                backend: "docling-serve".into(),
                hint: format!("{ENV_DOCLING_URL} is not set."),
            })?;
        if cfg.api_key.is_empty() {
            return Err(Pdf2ZipError::ProviderNotConfigured {
                backend: "docling-serve".into(),
                hint: format!("{ENV_DOCLING_KEY} is not set."),
            });
        }
        Ok(cfg)
    }

    /// Environment to hand to an isolated worker so it resolves the same
    /// settings as this process.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut vars = Vec::new();
        if let Some(ref p) = self.pdfium_lib_path {
            vars.push((ENV_PDFIUM_LIB, p.display().to_string()));
        }
        if let Some(ref d) = self.docling {
            vars.extend(d.to_env());
        }
        vars
    }
}

/// Table extraction accuracy requested from docling-serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableMode {
    Fast,
    /// (default)
    #[default]
    Accurate,
}

impl TableMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TableMode::Fast => "fast",
            TableMode::Accurate => "accurate",
        }
    }
}

/// docling-serve endpoint and conversion options.
#[derive(Clone, Serialize, Deserialize)]
pub struct DoclingConfig {
    /// Base URL; `/v1/convert/file` is appended.
    pub base_url: String,
    /// Bearer token sent in the `Authorization` header.
    pub api_key: String,
    /// OCR engine: easyocr, tesseract or rapidocr. Default: easyocr.
    pub ocr_engine: String,
    /// OCR languages. Default: en, fr, de, it.
    pub ocr_lang: Vec<String>,
    /// Table extraction mode. Default: accurate.
    pub table_mode: TableMode,
    /// Inclusive 1-based page range; None converts every page.
    pub page_range: Option<(u32, u32)>,
    /// PDF parsing backend on the server. Default: pypdfium2.
    pub pdf_backend: String,
    /// Server-side per-document timeout in seconds. Default: 3600.
    pub document_timeout_secs: u64,
    /// HTTP request timeout in seconds. Default: 120.
    pub request_timeout_secs: u64,
    /// Connection pool shared by every request made with this config.
    #[serde(skip)]
    pub client: reqwest::Client,
}

impl fmt::Debug for DoclingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoclingConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("ocr_engine", &self.ocr_engine)
            .field("ocr_lang", &self.ocr_lang)
            .field("table_mode", &self.table_mode)
            .field("page_range", &self.page_range)
            .field("pdf_backend", &self.pdf_backend)
            .field("document_timeout_secs", &self.document_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl DoclingConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ocr_engine: "easyocr".to_string(),
            ocr_lang: ["en", "fr", "de", "it"].iter().map(|s| s.to_string()).collect(),
            table_mode: TableMode::Accurate,
            page_range: None,
            pdf_backend: "pypdfium2".to_string(),
            document_timeout_secs: 3600,
            request_timeout_secs: 120,
            client: reqwest::Client::new(),
        }
    }

    /// Build from `DOCLING_HTTP_CLIENT` / `DOCLING_API_KEY` plus the optional
    /// `DOCLING_OCR_ENGINE`, `DOCLING_OCR_LANG` (comma list),
    /// `DOCLING_TABLE_MODE`, `DOCLING_PAGE_RANGE` (`start-end`),
    /// `DOCLING_PDF_BACKEND`, `DOCLING_DOCUMENT_TIMEOUT` and
    /// `DOCLING_REQUEST_TIMEOUT` (seconds).
    ///
    /// Returns None when no base URL is set. A missing token is reported
    /// later by [`BackendConfig::check`].
    pub fn from_env() -> Option<Self> {
        Self::from_vars(non_empty_env)
    }

    /// Same as [`DoclingConfig::from_env`], reading variables through `var`.
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let base_url = var(ENV_DOCLING_URL)?;
        let mut cfg = Self::new(base_url, var(ENV_DOCLING_KEY).unwrap_or_default());
        if let Some(engine) = var(ENV_DOCLING_OCR_ENGINE) {
            cfg.ocr_engine = engine;
        }
        if let Some(backend) = var(ENV_DOCLING_PDF_BACKEND) {
            cfg.pdf_backend = backend;
        }
        if let Some(secs) = var(ENV_DOCLING_DOCUMENT_TIMEOUT).and_then(|v| parse_secs(&v)) {
            cfg.document_timeout_secs = secs;
        }
        if let Some(secs) = var(ENV_DOCLING_REQUEST_TIMEOUT).and_then(|v| parse_secs(&v)) {
            cfg.request_timeout_secs = secs;
        }
        if let Some(langs) = var(ENV_DOCLING_OCR_LANG) {
            cfg.ocr_lang = langs
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
        }
        if let Some(mode) = var(ENV_DOCLING_TABLE_MODE) {
            if mode.eq_ignore_ascii_case("fast") {
                cfg.table_mode = TableMode::Fast;
            }
        }
        cfg.page_range = var(ENV_DOCLING_PAGE_RANGE).and_then(|r| parse_page_range(&r));
        Some(cfg)
    }

    fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            (ENV_DOCLING_URL, self.base_url.clone()),
            (ENV_DOCLING_KEY, self.api_key.clone()),
            (ENV_DOCLING_OCR_ENGINE, self.ocr_engine.clone()),
            (ENV_DOCLING_OCR_LANG, self.ocr_lang.join(",")),
            (ENV_DOCLING_TABLE_MODE, self.table_mode.as_str().to_string()),
            (ENV_DOCLING_PDF_BACKEND, self.pdf_backend.clone()),
            (ENV_DOCLING_DOCUMENT_TIMEOUT, self.document_timeout_secs.to_string()),
            (ENV_DOCLING_REQUEST_TIMEOUT, self.request_timeout_secs.to_string()),
        ];
        if let Some((start, end)) = self.page_range {
            vars.push((ENV_DOCLING_PAGE_RANGE, format!("{start}-{end}")));
        }
        vars
    }
}

/// Parse `"3-15"` into `(3, 15)`. Rejects zero and reversed ranges.
pub fn parse_page_range(s: &str) -> Option<(u32, u32)> {
    let (start, end) = s.split_once('-')?;
    let start: u32 = start.trim().parse().ok()?;
    let end: u32 = end.trim().parse().ok()?;
    (start >= 1 && start <= end).then_some((start, end))
}

/// Whole seconds, at least 1.
fn parse_secs(s: &str) -> Option<u64> {
    s.trim().parse().ok().filter(|&secs| secs > 0)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
