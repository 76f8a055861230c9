//! Streaming batch API: emit outcomes as jobs complete.
//!
//! [`convert_stream`] yields one [`ConversionOutcome`] per job, in completion
//! order rather than input order. Sort by `sequence_index` if order matters.
//! [`crate::convert::run_batch`] is a thin fold over this stream.

use crate::config::RenderConfig;
use crate::convert::{run_job, PipelineContext};
use crate::error::StartupError;
use crate::output::ConversionOutcome;
use crate::pipeline::input::ConversionJob;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// A boxed stream of job outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = ConversionOutcome> + Send>>;

/// Convert every job, at most `config.max_workers` at a time.
///
/// Jobs beyond the pool size wait until a slot frees up. Nothing runs until
/// the stream is polled.
///
/// # Errors
/// [`StartupError::HttpClient`] if the shared HTTP client cannot be built.
pub fn convert_stream(
    jobs: Vec<ConversionJob>,
    config: &RenderConfig,
) -> Result<OutcomeStream, StartupError> {
    let ctx = Arc::new(PipelineContext::new(config)?);
    let workers = config.max_workers.max(1);

    let s = stream::iter(jobs.into_iter().map(move |job| {
        let ctx = Arc::clone(&ctx);
        run_job(job, ctx)
    }))
    .buffer_unordered(workers);

    Ok(Box::pin(s))
}
