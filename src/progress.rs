//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the orchestrator works through a batch: files starting and finishing,
//! retries being scheduled, circuit-breaker cooldowns, the detected assembly.
//!
//! # Example
//!
//! ```rust
//! use drawing_extract::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, file: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {} done", index + 1, total, file);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::CustomerDetection;
use crate::retry::RetryAttempt;
use std::sync::Arc;
use std::time::Duration;

/// Called by the batch orchestrator as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is 0-based; `total` is the batch size.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before anything else, with the number of input files.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called once the customer for the batch is known.
    fn on_customer(&self, detection: &CustomerDetection) {
        let _ = detection;
    }

    /// Called just before a file's extraction starts.
    fn on_file_start(&self, index: usize, total: usize, file: &str) {
        let _ = (index, total, file);
    }

    /// Called when a file produced at least one item.
    fn on_file_complete(&self, index: usize, total: usize, file: &str) {
        let _ = (index, total, file);
    }

    /// Called when a file failed (retries exhausted, fatal error, or empty).
    fn on_file_error(&self, index: usize, total: usize, file: &str, error: &str) {
        let _ = (index, total, file, error);
    }

    /// Called before each backoff sleep.
    fn on_retry(&self, file: &str, attempt: &RetryAttempt<'_>) {
        let _ = (file, attempt);
    }

    /// Called when the circuit breaker opens and starts its cooldown.
    fn on_cooldown(&self, consecutive_failures: usize, cooldown: Duration) {
        let _ = (consecutive_failures, cooldown);
    }

    /// Called after assembly detection, before any restricted re-extraction.
    fn on_assembly(&self, part_number: &str) {
        let _ = part_number;
    }

    /// Called once after the batch (including the assembly merge) finished.
    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        let _ = (succeeded, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
