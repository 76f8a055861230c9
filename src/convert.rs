//! Batch conversion entry points.
//!
//! [`run_batch`] waits for every job and returns a [`BatchSummary`]. Use
//! [`crate::stream::convert_stream`] instead to consume outcomes as they
//! complete.
//!
//! Every job runs fetch → transcode → assemble → render inside its own
//! spawned task. Whatever happens in there (an error, or even a panic) is
//! turned into a failed [`ConversionOutcome`], so one bad URL never stops its
//! siblings and the batch always yields one outcome per job.

use crate::config::RenderConfig;
use crate::error::{JobError, StartupError};
use crate::output::{BatchSummary, ConversionOutcome};
use crate::pipeline::fetch::{page_headers, ContentFetcher};
use crate::pipeline::input::ConversionJob;
use crate::pipeline::render::{render_document, RenderOptions, Renderer, WkhtmltopdfRenderer};
use crate::pipeline::{assemble, transcode};
use crate::stream::convert_stream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a worker needs, shared read-only across the batch.
pub struct PipelineContext {
    pub config: Arc<RenderConfig>,
    pub fetcher: ContentFetcher,
    pub renderer: Arc<dyn Renderer>,
}

impl PipelineContext {
    /// Build the shared HTTP client and resolve the renderer.
    pub fn new(config: &RenderConfig) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StartupError::HttpClient(e.to_string()))?;

        Ok(Self {
            fetcher: ContentFetcher::from_config(client, config),
            renderer: resolve_renderer(config),
            config: Arc::new(config.clone()),
        })
    }
}

/// Run a batch of jobs through a pool of `config.max_workers` workers.
///
/// # Returns
/// `Ok(BatchSummary)` once every job has reported, even if all of them
/// failed. `summary.total()` always equals `jobs.len()`.
///
/// # Errors
/// Only [`StartupError`]s raised before the first job is scheduled.
pub async fn run_batch(
    jobs: Vec<ConversionJob>,
    config: &RenderConfig,
) -> Result<BatchSummary, StartupError> {
    let batch_start = Instant::now();
    let total = jobs.len();
    info!(
        "Starting batch: {} URLs, {} workers",
        total, config.max_workers
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut outcomes = convert_stream(jobs, config)?;
    let mut summary = BatchSummary::default();
    while let Some(outcome) = outcomes.next().await {
        summary.record(outcome);
        debug!(
            "Progress: {}/{} ({} failed)",
            summary.total(),
            total,
            summary.failure_count
        );
    }
    summary.finalize(batch_start.elapsed().as_millis() as u64);

    info!(
        "Batch complete: {} succeeded, {} failed, {}ms total",
        summary.success_count, summary.failure_count, summary.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(&summary);
    }

    Ok(summary)
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_batch_sync(
    jobs: Vec<ConversionJob>,
    config: &RenderConfig,
) -> Result<BatchSummary, StartupError> {
    tokio::runtime::Runtime::new()
        .map_err(StartupError::Runtime)?
        .block_on(run_batch(jobs, config))
}

/// Convert a single URL: fetch → transcode → assemble → render.
///
/// # Errors
/// [`JobError::Fetch`] when the page cannot be downloaded and
/// [`JobError::Render`] when the renderer fails. Image problems are never
/// errors here.
pub async fn convert_url(job: &ConversionJob, ctx: &PipelineContext) -> Result<(), JobError> {
    let config = &ctx.config;

    // ── Step 1: Fetch page ───────────────────────────────────────────────
    let fetched = ctx
        .fetcher
        .fetch(&job.url, &page_headers(&config.user_agent), config.timeout())
        .await?;

    // Pages stay in their own encoding end to end.
    let declared = fetched.declared_encoding();

    // ── Step 2: Inline WebP images ───────────────────────────────────────
    let document = if config.convert_source_image_format {
        transcode::transcode(
            ctx.fetcher.client(),
            &fetched.body,
            &fetched.final_url,
            declared,
            config,
        )
        .await
    } else {
        fetched.body
    };

    // ── Step 3: Inject <base> and MathJax ────────────────────────────────
    let document = assemble::assemble(&document, fetched.final_url.as_str(), declared);

    // ── Step 4: Render ───────────────────────────────────────────────────
    let options = RenderOptions {
        javascript_delay_ms: config.javascript_delay_ms,
        timeout: config.render_timeout(),
    };
    render_document(ctx.renderer.as_ref(), &document, &job.output_path, &options).await?;

    Ok(())
}

/// Run one job to completion and report it. Never fails.
///
/// The pipeline runs in its own task so a panic is caught as a `JoinError`
/// instead of tearing down the stream that drives the batch.
pub(crate) async fn run_job(job: ConversionJob, ctx: Arc<PipelineContext>) -> ConversionOutcome {
    let start = Instant::now();
    let callback = ctx.config.progress_callback.clone();

    if let Some(ref cb) = callback {
        cb.on_job_start(&job);
    }
    info!("Processing {}...", job.url);

    let task = {
        let ctx = Arc::clone(&ctx);
        let job = job.clone();
        tokio::spawn(async move { convert_url(&job, &ctx).await })
    };
    let result = match task.await {
        Ok(result) => result,
        Err(e) => Err(JobError::Internal(format!("worker task failed: {e}"))),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    let outcome = match result {
        Ok(()) => {
            info!("Successfully saved to {}", job.output_path.display());
            ConversionOutcome::success(job.sequence_index, &job.url, job.output_path, duration_ms)
        }
        Err(e) => {
            warn!("Failed to process {}: {}", job.url, e);
            ConversionOutcome::failure(
                job.sequence_index,
                &job.url,
                job.output_path,
                e.to_string(),
                duration_ms,
            )
        }
    };

    if let Some(ref cb) = callback {
        if outcome.succeeded {
            cb.on_job_complete(&outcome);
        } else {
            cb.on_job_error(&outcome);
        }
    }

    outcome
}

/// Pick the renderer: an injected one wins over the configured program.
fn resolve_renderer(config: &RenderConfig) -> Arc<dyn Renderer> {
    if let Some(ref renderer) = config.renderer {
        return Arc::clone(renderer);
    }
    Arc::new(WkhtmltopdfRenderer::new(config.renderer_program.clone()))
}
