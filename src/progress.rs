//! Progress-callback trait for per-row batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the orchestrator walks the table. The CLI drives a terminal progress bar
//! from it; library callers can forward events wherever they like.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2zip::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_row_converted(&self, name: &str, text_len: usize) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{name}: {text_len} bytes");
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { converted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::batch::BatchStats;
use std::sync::Arc;

/// Called by the orchestrator as it processes each row.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Rows are processed sequentially, but the trait is
/// `Send + Sync` so a callback can be shared with other tasks.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after planning, before any download.
    ///
    /// * `total_rows`: rows in the input table
    /// * `pending`: rows that will be fetched and converted
    fn on_batch_start(&self, total_rows: usize, pending: usize) {
        let _ = (total_rows, pending);
    }

    /// Called when a row is satisfied from the archive.
    fn on_cache_hit(&self, name: &str) {
        let _ = name;
    }

    /// Called before a pending row is downloaded.
    fn on_row_start(&self, position: usize, pending: usize, name: &str) {
        let _ = (position, pending, name);
    }

    /// Called when a row's text was stored in the archive.
    fn on_row_converted(&self, name: &str, text_len: usize) {
        let _ = (name, text_len);
    }

    /// Called when conversion succeeded but produced no text.
    fn on_row_empty(&self, name: &str) {
        let _ = name;
    }

    /// Called when a row failed (download, conversion or cache write).
    fn on_row_error(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called once after every pending row has been attempted.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        converted: AtomicUsize,
        errors: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_row_start(&self, _position: usize, _pending: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_row_converted(&self, _name: &str, _text_len: usize) {
            self.converted.fetch_add(1, Ordering::SeqCst);
        }

        fn on_row_error(&self, _name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3, 2);
        cb.on_cache_hit("a_pdfium.md");
        cb.on_row_start(1, 2, "b_pdfium.md");
        cb.on_row_converted("b_pdfium.md", 42);
        cb.on_row_empty("c_pdfium.md");
        cb.on_row_error("d_pdfium.md", "HTTP 404");
        cb.on_batch_complete(&BatchStats::default());
    }

    #[test]
    fn tracking_callback_through_arc_dyn() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();

        cb.on_row_start(1, 2, "a");
        cb.on_row_converted("a", 10);
        cb.on_row_start(2, 2, "b");
        cb.on_row_error("b", "timeout");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.converted.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
