//! Error types for the url2pdf library.
//!
//! Failures are split by how far they are allowed to travel:
//!
//! * [`StartupError`] — **Process-fatal**: the batch cannot start at all
//!   (unreadable URL file, empty URL list, invalid configuration). Returned
//!   as `Err(StartupError)` before any job runs.
//!
//! * [`JobError`] — **Job-fatal**: one URL could not be converted (page fetch
//!   exhausted its retries, renderer exited non-zero). Never propagated past
//!   the orchestrator; it is flattened into a failed
//!   [`crate::output::ConversionOutcome`] so sibling jobs keep running.
//!
//! * [`ImageError`] — **Non-fatal**: a single embedded image could not be
//!   downloaded or re-encoded. Logged and discarded by the transcoder; the
//!   image reference is left untouched.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the whole run before any job starts.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The URL list file could not be opened or read.
    #[error("Failed to read URL file '{path}': {source}")]
    UrlFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The URL list file was read but contains no URLs.
    #[error("No URLs found in '{path}'")]
    NoUrls { path: PathBuf },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The shared HTTP client could not be constructed.
    #[error("Failed to initialise HTTP client: {0}")]
    HttpClient(String),

    /// The tokio runtime for the blocking entry point could not start.
    #[error("Failed to create async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// The page itself could not be fetched after every allowed attempt.
#[derive(Debug, Clone, Error)]
#[error("Failed to fetch '{url}' after {attempts} attempt(s): {reason}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    pub reason: String,
}

/// A single image could not be inlined. Always recoverable.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Network or HTTP-status failure while downloading the image.
    #[error("Download failed for '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The image grew past the configured byte cap mid-download.
    #[error("Image '{url}' exceeds the {limit}-byte limit")]
    TooLarge { url: String, limit: u64 },

    /// The bytes could not be decoded or re-encoded.
    #[error("Image codec error for '{url}': {source}")]
    Codec {
        url: String,
        #[source]
        source: image::ImageError,
    },

    /// The blocking decode task panicked or was cancelled.
    #[error("Image task for '{url}' did not complete: {detail}")]
    Task { url: String, detail: String },
}

/// Failures at the external renderer boundary.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The transient HTML file could not be created or written.
    #[error("Failed to write transient HTML file: {0}")]
    TempFile(#[source] std::io::Error),

    /// The renderer process could not be started at all.
    #[error("Failed to launch renderer '{program}': {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The renderer ran but reported failure.
    #[error("Renderer exited with {status}: {detail}")]
    Failed { status: String, detail: String },

    /// The renderer did not finish within the per-invocation timeout.
    #[error("Renderer timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Everything that can end a single job's pipeline.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// The worker task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}
