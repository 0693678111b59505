//! PDF download: stream a URL to a local file for the converter.
//!
//! Failures are per-row ([`RowError`]) rather than fatal: the orchestrator
//! records them and moves on. A failed download never leaves a partial file
//! behind, since a truncated PDF handed to the converter could hang or crash
//! it.

use crate::error::RowError;
use futures::StreamExt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// PDF readers accept the `%PDF` header anywhere in this many leading bytes.
const HEADER_WINDOW: usize = 1024;
const PDF_MAGIC: &[u8] = b"%PDF";

/// True when `head` holds a PDF header within [`HEADER_WINDOW`] bytes.
fn has_pdf_header(head: &[u8]) -> bool {
    let head = &head[..head.len().min(HEADER_WINDOW)];
    head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

/// Something that can place the PDF behind `url` at `dest`.
///
/// Returns the number of bytes written.
pub trait Fetcher {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> impl Future<Output = Result<u64, RowError>> + Send;
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    let input = input.trim();
    input.starts_with("http://") || input.starts_with("https://")
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pdf2zip/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Use an existing client (shared connection pool, custom TLS, proxies).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64, RowError> {
        info!("Downloading PDF from: {}", url);
        let secs = timeout.as_secs();
        let map_reqwest = |e: reqwest::Error| {
            if e.is_timeout() {
                RowError::FetchTimeout {
                    url: url.to_string(),
                    secs,
                }
            } else {
                RowError::FetchFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };
        let map_io = |e: std::io::Error| RowError::FetchFailed {
            url: url.to_string(),
            reason: format!("Failed to write {}: {}", dest.display(), e),
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest)?;

        if !response.status().is_success() {
            return Err(RowError::FetchFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(map_io)?;
        let mut stream = response.bytes_stream();
        let mut head: Vec<u8> = Vec::with_capacity(HEADER_WINDOW);
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest)?;
            if head.len() < HEADER_WINDOW {
                let take = (HEADER_WINDOW - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            file.write_all(&chunk).await.map_err(map_io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(map_io)?;

        if !has_pdf_header(&head) {
            head.truncate(PDF_MAGIC.len());
            return Err(RowError::NotAPdf {
                url: url.to_string(),
                magic: head,
            });
        }

        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64, RowError> {
        let result = self.download(url, dest, timeout).await;
        if let Err(ref e) = result {
            warn!("{}", e);
            if let Err(rm) = tokio::fs::remove_file(dest).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove partial download {}: {}", dest.display(), rm);
                }
            }
        }
        result
    }
}
