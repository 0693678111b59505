//! Crash isolation: run one conversion in a supervised child process.
//!
//! Some PDFs make extraction libraries crash or hang. The worker is a
//! separate process invoked as `<program> <args..> <input> <method> --format
//! <md|txt>`; it prints the converted text on stdout and diagnostics on
//! stderr, and exits non-zero on failure. A wall-clock timeout kills it.
//! Every outcome becomes a [`RowError`] or text, never a panic in the batch.

use crate::backend::Converter;
use crate::config::BackendConfig;
use crate::error::{Pdf2ZipError, RowError};
use crate::method::Method;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Subcommand the `pdf2zip` binary exposes as its worker entry point.
pub const WORKER_SUBCOMMAND: &str = "convert";

/// Keep at most this much of a worker's stderr in error reports.
const MAX_STDERR_CHARS: usize = 4000;

/// The program and leading arguments that start a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-invoke the running executable with its `convert` subcommand.
    pub fn current_exe() -> Result<Self, Pdf2ZipError> {
        let exe = std::env::current_exe()
            .map_err(|e| Pdf2ZipError::Internal(format!("Cannot locate current executable: {}", e)))?;
        Ok(Self::new(exe, [WORKER_SUBCOMMAND]))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Run `method` on `input` in a worker and return its stdout.
///
/// Exit 0 yields the (possibly empty) stdout. `env` is added to the
/// worker's inherited environment.
pub async fn run_isolated(
    worker: &WorkerCommand,
    input: &Path,
    method: &Method,
    timeout: Duration,
    env: &[(&str, String)],
) -> Result<String, RowError> {
    let program = worker.program.display().to_string();
    debug!("Spawning worker {} for {}", program, input.display());

    let child = Command::new(&worker.program)
        .args(&worker.args)
        .arg(input)
        .arg(method.id())
        .arg("--format")
        .arg(method.format().extension())
        .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RowError::WorkerSpawn {
            program: program.clone(),
            detail: e.to_string(),
        })?;

    // Dropping the pending wait on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| RowError::ConvertFailed {
            status: None,
            detail: format!("Failed to collect worker output: {}", e),
        })?,
        Err(_) => {
            warn!("Worker for {} exceeded {}s, killed", input.display(), timeout.as_secs());
            return Err(RowError::ConvertTimeout {
                secs: timeout.as_secs(),
            });
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(RowError::ConvertFailed {
            status: output.status.code(),
            detail: tail(stderr.trim(), MAX_STDERR_CHARS),
        });
    }
    if !stderr.trim().is_empty() {
        debug!("Worker stderr: {}", stderr.trim());
    }

    String::from_utf8(output.stdout).map_err(|_| RowError::ConvertFailed {
        status: Some(0),
        detail: "Worker produced non-UTF-8 output".to_string(),
    })
}

fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let skip = count - max_chars;
    format!("…{}", s.chars().skip(skip).collect::<String>())
}

/// [`Converter`] that runs every conversion through [`run_isolated`].
#[derive(Debug, Clone)]
pub struct IsolatedConverter {
    worker: WorkerCommand,
    backend: BackendConfig,
}

impl IsolatedConverter {
    pub fn new(worker: WorkerCommand, backend: BackendConfig) -> Self {
        info!("Conversions isolated in worker: {}", worker.program.display());
        Self { worker, backend }
    }
}

impl Converter for IsolatedConverter {
    async fn convert(
        &self,
        input: &Path,
        method: &Method,
        timeout: Duration,
    ) -> Result<String, RowError> {
        let env = self.backend.to_env();
        run_isolated(&self.worker, input, method, timeout, &env).await
    }

    fn check(&self, method: &Method) -> Result<(), Pdf2ZipError> {
        self.backend.check(method)
    }
}
