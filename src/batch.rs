//! Batch orchestration: table rows in, archive entries out.
//!
//! For every row the orchestrator derives an entry name from the naming
//! column and the method, then decides whether the row is invalid, a
//! duplicate of an earlier row, already cached, or pending. Pending rows are
//! fetched, converted and written to the archive one at a time.
//!
//! Per-row failures never abort the batch. A row that fails (or converts to
//! nothing) gets no archive entry, so the next run picks it up again; rows
//! already in the archive are skipped. Re-running after a crash therefore
//! resumes where the previous run stopped.

use crate::archive::ArchiveCache;
use crate::backend::Converter;
use crate::config::BatchConfig;
use crate::error::{Pdf2ZipError, RowError};
use crate::fetch::{is_url, Fetcher};
use crate::table::Table;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// What happened to one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    /// Converted in this run and stored in the archive.
    Converted { bytes: usize },
    /// Entry already present; nothing fetched.
    CacheHit,
    /// Conversion succeeded but produced no text. Not cached.
    Empty,
    /// Download, conversion or cache write failed. Not cached.
    Failed { error: RowError },
    /// Missing or unusable URL or naming key.
    Invalid { reason: String },
    /// An earlier row already claimed the same entry name.
    Duplicate { of_row: usize },
}

/// Outcome for one input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    /// 0-based position in the input table.
    pub row_index: usize,
    /// Archive entry name, when the naming key was usable.
    pub target_name: Option<String>,
    #[serde(flatten)]
    pub status: RowStatus,
}

/// Counts per [`RowStatus`] plus timing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total_rows: usize,
    pub converted: usize,
    pub cache_hits: usize,
    pub empty: usize,
    pub failed: usize,
    pub invalid: usize,
    pub duplicates: usize,
    /// Rows that were fetched (successfully or not) in this run.
    pub fetched: usize,
    pub bytes_written: u64,
    pub duration_ms: u64,
}

impl BatchStats {
    fn record(&mut self, status: &RowStatus) {
        match status {
            RowStatus::Converted { bytes } => {
                self.converted += 1;
                self.bytes_written += *bytes as u64;
            }
            RowStatus::CacheHit => self.cache_hits += 1,
            RowStatus::Empty => self.empty += 1,
            RowStatus::Failed { .. } => self.failed += 1,
            RowStatus::Invalid { .. } => self.invalid += 1,
            RowStatus::Duplicate { .. } => self.duplicates += 1,
        }
    }
}

/// Result of [`process`]: the updated table and one outcome per row.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    #[serde(skip)]
    pub table: Table,
    pub outcomes: Vec<RowOutcome>,
    pub stats: BatchStats,
}

/// Scratch directory for downloaded PDFs.
///
/// A temporary directory is removed when this value is dropped; a directory
/// supplied by the caller is left in place.
#[derive(Debug)]
pub enum WorkDir {
    Temporary(TempDir),
    Provided(PathBuf),
}

impl WorkDir {
    pub fn path(&self) -> &Path {
        match self {
            WorkDir::Temporary(dir) => dir.path(),
            WorkDir::Provided(path) => path,
        }
    }
}

/// Create the scratch directory named by `config.work_dir`, or a temp dir.
pub fn prepare_work_dir(config: &BatchConfig) -> Result<WorkDir, Pdf2ZipError> {
    match config.work_dir {
        Some(ref path) => {
            std::fs::create_dir_all(path).map_err(|source| Pdf2ZipError::WorkDir {
                path: path.clone(),
                source,
            })?;
            Ok(WorkDir::Provided(path.clone()))
        }
        None => {
            let dir = tempfile::Builder::new()
                .prefix("pdf2zip-")
                .tempdir()
                .map_err(|source| Pdf2ZipError::WorkDir {
                    path: std::env::temp_dir(),
                    source,
                })?;
            Ok(WorkDir::Temporary(dir))
        }
    }
}

/// Per-row plan before any download happens.
struct Planned {
    target_name: Option<String>,
    status: Option<RowStatus>,
}

/// Run the batch over `table`.
///
/// # Errors
/// Only setup failures are returned: a missing column, an unusable archive,
/// missing backend configuration, or a work directory that cannot be
/// created. Everything that goes wrong for a single row is reported in its
/// [`RowOutcome`].
pub async fn process<F, C>(
    mut table: Table,
    config: &BatchConfig,
    fetcher: &F,
    converter: &C,
) -> Result<BatchReport, Pdf2ZipError>
where
    F: Fetcher,
    C: Converter,
{
    let start = Instant::now();
    let method = &config.method;
    info!("Starting batch: {} rows, method {}", table.len(), method);

    // ── Step 1: Validate setup ───────────────────────────────────────────
    let url_col = table.require_column(&config.url_column)?;
    let name_col = table.require_column(&config.name_column)?;
    converter.check(method)?;

    let mut archive = ArchiveCache::ensure(&config.archive_path)?;
    info!(
        "Archive {} holds {} entries",
        archive.path().display(),
        archive.len()
    );

    let out_col = config
        .merge_output
        .then(|| table.ensure_column(&config.resolved_output_column()));
    let work_dir = prepare_work_dir(config)?;

    // ── Step 2: Plan ─────────────────────────────────────────────────────
    let mut claimed: HashMap<String, usize> = HashMap::new();
    let mut plan: Vec<Planned> = Vec::with_capacity(table.len());
    let mut pending: Vec<usize> = Vec::new();

    for row in 0..table.len() {
        let url = table.get(row, url_col).unwrap_or_default().trim();
        let key = table.get(row, name_col).unwrap_or_default();
        let target = method.target_name(key);

        let status = match target {
            _ if url.is_empty() => Some(RowStatus::Invalid {
                reason: "empty URL".to_string(),
            }),
            _ if !is_url(url) => Some(RowStatus::Invalid {
                reason: format!("not an http(s) URL: '{url}'"),
            }),
            None => Some(RowStatus::Invalid {
                reason: "empty naming key".to_string(),
            }),
            Some(ref name) => match claimed.get(name) {
                Some(&first) => Some(RowStatus::Duplicate { of_row: first }),
                None => {
                    claimed.insert(name.clone(), row);
                    if !config.force_replace && archive.contains(name) {
                        Some(RowStatus::CacheHit)
                    } else {
                        pending.push(row);
                        None
                    }
                }
            },
        };
        plan.push(Planned {
            target_name: target,
            status,
        });
    }

    let cb = config.progress_callback.as_ref();
    debug!("Plan: {} pending of {} rows", pending.len(), table.len());
    if let Some(cb) = cb {
        cb.on_batch_start(table.len(), pending.len());
    }

    // ── Step 3: Cache hits ───────────────────────────────────────────────
    for (row, planned) in plan.iter().enumerate() {
        if planned.status != Some(RowStatus::CacheHit) {
            continue;
        }
        let Some(ref name) = planned.target_name else {
            continue;
        };
        debug!("Cache hit: {}", name);
        if let Some(cb) = cb {
            cb.on_cache_hit(name);
        }
        if let Some(col) = out_col {
            match archive.read_to_string(name) {
                Ok(text) => table.set(row, col, text),
                Err(e) => warn!("Could not read cached '{}': {}", name, e),
            }
        }
    }

    // ── Step 4: Fetch, convert, store ────────────────────────────────────
    let download_timeout = Duration::from_secs(config.download_timeout_secs);
    let convert_timeout = Duration::from_secs(config.convert_timeout_secs);
    let mut fetched = 0usize;

    for (position, &row) in pending.iter().enumerate() {
        let Some(name) = plan[row].target_name.clone() else {
            continue;
        };
        let url = table.get(row, url_col).unwrap_or_default().trim().to_string();
        info!("Row {}/{}: {} <- {}", position + 1, pending.len(), name, url);
        if let Some(cb) = cb {
            cb.on_row_start(position + 1, pending.len(), &name);
        }

        let dest = work_dir.path().join(format!("{name}.pdf"));
        fetched += 1;
        let (status, text) = match fetcher.fetch(&url, &dest, download_timeout).await {
            Err(e) => (RowStatus::Failed { error: e }, None),
            Ok(bytes) => {
                debug!("Fetched {} bytes for {}", bytes, name);
                let converted = converter.convert(&dest, method, convert_timeout).await;
                remove_download(&dest).await;
                store(&mut archive, &name, converted)
            }
        };

        match status {
            RowStatus::Converted { bytes } => {
                info!("Stored {} ({} bytes)", name, bytes);
                if let Some(cb) = cb {
                    cb.on_row_converted(&name, bytes);
                }
            }
            RowStatus::Empty => {
                warn!("Conversion of {} produced no text; not cached", name);
                if let Some(cb) = cb {
                    cb.on_row_empty(&name);
                }
            }
            RowStatus::Failed { ref error } => {
                warn!("Row {} ({}) failed: {}", row, name, error);
                if let Some(cb) = cb {
                    cb.on_row_error(&name, &error.to_string());
                }
            }
            _ => {}
        }

        if let (Some(col), Some(text)) = (out_col, text) {
            table.set(row, col, text);
        }
        plan[row].status = Some(status);

        if let Some(ref snapshot) = config.snapshot_path {
            if let Err(e) = table.write_csv_atomic(snapshot) {
                warn!("Snapshot after row {} failed: {}", row, e);
            }
        }
    }

    // ── Step 5: Copy results onto duplicate rows ─────────────────────────
    if let Some(col) = out_col {
        for (row, planned) in plan.iter().enumerate() {
            if let Some(RowStatus::Duplicate { of_row }) = planned.status {
                let value = table.get(of_row, col).unwrap_or_default().to_string();
                table.set(row, col, value);
            }
        }
    }
    if let Some(ref snapshot) = config.snapshot_path {
        table.write_csv_atomic(snapshot)?;
    }

    // ── Step 6: Report ───────────────────────────────────────────────────
    let mut stats = BatchStats {
        total_rows: table.len(),
        fetched,
        ..BatchStats::default()
    };
    let outcomes: Vec<RowOutcome> = plan
        .into_iter()
        .enumerate()
        .map(|(row_index, planned)| {
            let status = planned.status.unwrap_or(RowStatus::Empty);
            stats.record(&status);
            RowOutcome {
                row_index,
                target_name: planned.target_name,
                status,
            }
        })
        .collect();
    stats.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Batch complete: {} converted, {} cached, {} empty, {} failed, {} invalid, {} duplicate ({}ms)",
        stats.converted,
        stats.cache_hits,
        stats.empty,
        stats.failed,
        stats.invalid,
        stats.duplicates,
        stats.duration_ms
    );
    if let Some(cb) = cb {
        cb.on_batch_complete(&stats);
    }

    Ok(BatchReport {
        table,
        outcomes,
        stats,
    })
}

/// Turn a conversion result into a row status, writing non-empty text.
fn store(
    archive: &mut ArchiveCache,
    name: &str,
    converted: Result<String, RowError>,
) -> (RowStatus, Option<String>) {
    match converted {
        Err(error) => (RowStatus::Failed { error }, None),
        Ok(text) if text.trim().is_empty() => (RowStatus::Empty, None),
        Ok(text) => match archive.write(name, text.as_bytes()) {
            Ok(()) => (RowStatus::Converted { bytes: text.len() }, Some(text)),
            Err(e) => (
                RowStatus::Failed {
                    error: RowError::CacheWrite {
                        name: name.to_string(),
                        detail: e.to_string(),
                    },
                },
                None,
            ),
        },
    }
}

async fn remove_download(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}
