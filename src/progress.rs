//! Progress-callback trait for per-job batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::RenderConfigBuilder::progress_callback`] to receive
//! events as the orchestrator runs each URL.
//!
//! `on_job_start` fires once the job has taken a worker slot, and
//! `on_job_complete` / `on_job_error` fire before that slot is released. The
//! number of jobs between the two is therefore the number of jobs actually
//! executing, which makes the trait usable as a concurrency probe as well as
//! for progress bars.
//!
//! # Example
//!
//! ```rust
//! use url2pdf::{BatchProgressCallback, ConversionOutcome, RenderConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_job_error(&self, outcome: &ConversionOutcome) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} failed: {:?}", outcome.url, outcome.error);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { failed: AtomicUsize::new(0) });
//!
//! let config = RenderConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchSummary, ConversionOutcome};
use crate::pipeline::input::ConversionJob;
use std::sync::Arc;

/// Called by the orchestrator as it processes each job.
///
/// Implementations must be `Send + Sync`: job events arrive concurrently from
/// different worker tasks. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any job is scheduled.
    fn on_batch_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called when a job enters a worker slot, before its page is fetched.
    fn on_job_start(&self, job: &ConversionJob) {
        let _ = job;
    }

    /// Called when a job produced its PDF.
    fn on_job_complete(&self, outcome: &ConversionOutcome) {
        let _ = outcome;
    }

    /// Called when a job failed for any reason, including a worker panic.
    fn on_job_error(&self, outcome: &ConversionOutcome) {
        let _ = outcome;
    }

    /// Called once after every job has reported.
    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RenderConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
