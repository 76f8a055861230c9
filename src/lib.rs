//! # url2pdf
//!
//! Convert lists of web pages to PDF files, with MathJax-rendered formulas
//! and WebP images inlined as JPEG.
//!
//! ## Why this crate?
//!
//! `wkhtmltopdf` turns HTML into faithful PDFs, but fed a live URL it loses
//! two things that matter for technical writing: its old WebKit cannot
//! decode WebP, and it does not wait for client-side math typesetting. This
//! crate prepares each page first (images inlined, `<base>` and MathJax
//! injected) and then hands a local file to the renderer, running many URLs
//! side by side.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL list
//!  │
//!  ├─ 1. Input      one job per URL, output name derived from the URL
//!  ├─ 2. Fetch      GET with bounded retry (job-fatal on exhaustion)
//!  ├─ 3. Transcode  WebP <img> → inline JPEG data URI (per-image best effort)
//!  ├─ 4. Assemble   <base href> first in <head>, MathJax loader last
//!  ├─ 5. Render     transient .html → wkhtmltopdf → PDF
//!  └─ 6. Summary    per-URL outcomes + success/failure counts
//! ```
//!
//! Up to `max_workers` URLs run concurrently; a failing URL is reported in
//! the summary and never stops the others.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use url2pdf::{build_jobs, run_batch, RenderConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let urls = vec!["https://en.wikipedia.org/wiki/Euler%27s_identity".to_string()];
//!     let jobs = build_jobs(&urls, Path::new("output_pdfs"));
//!     let config = RenderConfig::builder().max_workers(2).build()?;
//!     let summary = run_batch(jobs, &config).await?;
//!     eprintln!("{} ok / {} failed", summary.success_count, summary.failure_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `url2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{RenderConfig, RenderConfigBuilder};
pub use convert::{convert_url, run_batch, run_batch_sync, PipelineContext};
pub use error::{FetchError, ImageError, JobError, RenderError, StartupError};
pub use output::{BatchSummary, ConversionOutcome, FailedConversion};
pub use pipeline::input::{build_jobs, read_url_file, safe_filename, ConversionJob};
pub use pipeline::render::{RenderOptions, RenderStatus, Renderer, WkhtmltopdfRenderer};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, OutcomeStream};
