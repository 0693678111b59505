//! Extraction backends and the [`Converter`] seam the orchestrator calls.
//!
//! [`convert_pdf`] is the strategy table: it maps a resolved [`Method`] to
//! the function that turns a local PDF into text. The orchestrator never
//! calls it directly; it goes through a [`Converter`], either in this
//! process ([`InProcessConverter`]) or in a supervised child process
//! ([`crate::isolate::IsolatedConverter`]).

pub mod docling;
pub mod pdfium;

use crate::config::BackendConfig;
use crate::error::{Pdf2ZipError, RowError};
use crate::method::{Backend, Method};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Turns a downloaded PDF into text for a given method.
///
/// `Ok("")` means the conversion ran and found no text; failures are
/// `Err(RowError)`.
pub trait Converter {
    fn convert(
        &self,
        input: &Path,
        method: &Method,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, RowError>> + Send;

    /// Validate configuration for `method` before any row is processed.
    fn check(&self, method: &Method) -> Result<(), Pdf2ZipError> {
        let _ = method;
        Ok(())
    }
}

/// Run the backend `method` resolves to on `input`.
pub async fn convert_pdf(
    input: &Path,
    method: &Method,
    config: &BackendConfig,
) -> Result<String, RowError> {
    debug!("Converting {} with {}", input.display(), method);
    match method.backend() {
        Backend::Heuristic => {
            pdfium::extract_markdown(input, config.pdfium_lib_path.as_deref()).await
        }
        Backend::PlainText => pdfium::extract_text(input, config.pdfium_lib_path.as_deref()).await,
        Backend::DoclingServe => {
            let docling = config.docling().map_err(|e| RowError::ConvertFailed {
                status: None,
                detail: e.to_string(),
            })?;
            docling::convert(input, docling, method.format()).await
        }
    }
}

/// Calls the backend directly in this process.
///
/// A timeout abandons the conversion, but a pdfium call already running on
/// the blocking pool cannot be interrupted; use the isolated converter for
/// untrusted input.
#[derive(Debug, Clone, Default)]
pub struct InProcessConverter {
    backend: BackendConfig,
}

impl InProcessConverter {
    pub fn new(backend: BackendConfig) -> Self {
        Self { backend }
    }
}

impl Converter for InProcessConverter {
    async fn convert(
        &self,
        input: &Path,
        method: &Method,
        timeout: Duration,
    ) -> Result<String, RowError> {
        tokio::time::timeout(timeout, convert_pdf(input, method, &self.backend))
            .await
            .map_err(|_| RowError::ConvertTimeout {
                secs: timeout.as_secs(),
            })?
    }

    fn check(&self, method: &Method) -> Result<(), Pdf2ZipError> {
        self.backend.check(method)
    }
}
