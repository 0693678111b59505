//! Error types for the edgequake-pdf2zip library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2ZipError`]: **fatal**, the batch cannot proceed at all (the
//!   archive cannot be created, the input table lacks a required column, a
//!   remote backend is not configured). Returned as `Err(Pdf2ZipError)` from
//!   [`crate::batch::process`] and the archive operations.
//!
//! * [`RowError`]: **non-fatal**, a single row failed (download error,
//!   crashed worker, timeout, cache write error) but every other row is fine.
//!   Stored inside [`crate::batch::RowOutcome`] so the batch always completes
//!   and the row is retried on the next run.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2zip library.
#[derive(Debug, Error)]
pub enum Pdf2ZipError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input table could not be read or parsed.
    #[error("Failed to read table '{path}': {source}")]
    TableRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A column named in the configuration is absent from the table header.
    #[error("Column '{column}' not found in table header (available: {available})")]
    MissingColumn { column: String, available: String },

    // ── Archive errors ────────────────────────────────────────────────────
    /// Filesystem error while creating, reading or replacing the archive.
    #[error("Archive I/O error on '{path}': {source}")]
    ArchiveIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive exists but is not a readable ZIP container.
    #[error("Archive '{path}' is not a valid ZIP file: {source}")]
    ArchiveFormat {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// A requested entry is not present in the archive.
    #[error("Entry '{name}' not found in archive '{path}'")]
    EntryNotFound { path: PathBuf, name: String },

    /// An entry exists but does not hold UTF-8 text.
    #[error("Entry '{name}' in archive '{path}' is not valid UTF-8")]
    EntryNotUtf8 { path: PathBuf, name: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not write the CSV snapshot or output table.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scratch directory for downloads could not be created.
    #[error("Failed to prepare work directory '{path}': {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A remote backend was selected but its credentials are missing.
    #[error("Backend '{backend}' is not configured.\n{hint}")]
    ProviderNotConfigured { backend: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single row.
///
/// Failed rows never produce an archive entry, so they are picked up again
/// automatically the next time the batch runs.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum RowError {
    /// Download failed (connection error, non-2xx status, I/O on the local copy).
    #[error("Failed to download '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    FetchTimeout { url: String, secs: u64 },

    /// The downloaded body is not a PDF.
    #[error("Downloaded file from '{url}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { url: String, magic: Vec<u8> },

    /// The worker process could not be started.
    #[error("Failed to spawn conversion worker '{program}': {detail}")]
    WorkerSpawn { program: String, detail: String },

    /// The backend raised, or the worker exited with a non-zero status.
    #[error("Conversion failed{}: {detail}", status_suffix(.status))]
    ConvertFailed { status: Option<i32>, detail: String },

    /// The worker did not finish in time and was killed.
    #[error("Conversion timed out after {secs}s; worker killed")]
    ConvertTimeout { secs: u64 },

    /// The converted text could not be stored in the archive.
    #[error("Failed to write '{name}' to the archive: {detail}")]
    CacheWrite { name: String, detail: String },
}

fn status_suffix(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!(" (exit status {code})"),
        None => String::new(),
    }
}

impl RowError {
    /// Short machine-friendly label used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RowError::FetchFailed { .. } | RowError::FetchTimeout { .. } | RowError::NotAPdf { .. } => {
                "fetch"
            }
            RowError::WorkerSpawn { .. }
            | RowError::ConvertFailed { .. }
            | RowError::ConvertTimeout { .. } => "convert",
            RowError::CacheWrite { .. } => "cache",
        }
    }
}
