//! Result types produced by a conversion batch.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of converting one URL. Exactly one is produced per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    /// 1-based position of the URL in the input list.
    pub sequence_index: usize,
    pub url: String,
    pub output_path: PathBuf,
    pub succeeded: bool,
    /// Human-readable failure reason when `succeeded` is false.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ConversionOutcome {
    pub(crate) fn success(
        sequence_index: usize,
        url: &str,
        output_path: PathBuf,
        duration_ms: u64,
    ) -> Self {
        Self {
            sequence_index,
            url: url.to_string(),
            output_path,
            succeeded: true,
            error: None,
            duration_ms,
        }
    }

    pub(crate) fn failure(
        sequence_index: usize,
        url: &str,
        output_path: PathBuf,
        error: String,
        duration_ms: u64,
    ) -> Self {
        Self {
            sequence_index,
            url: url.to_string(),
            output_path,
            succeeded: false,
            error: Some(error),
            duration_ms,
        }
    }
}

/// A failed URL and the captured error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedConversion {
    pub url: String,
    pub error: String,
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub success_count: usize,
    pub failure_count: usize,
    /// Failed URLs in input order.
    pub failures: Vec<FailedConversion>,
    /// Every outcome, in completion order.
    pub outcomes: Vec<ConversionOutcome>,
    pub total_duration_ms: u64,
}

impl BatchSummary {
    /// Fold one outcome into the running counts.
    pub fn record(&mut self, outcome: ConversionOutcome) {
        if outcome.succeeded {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Number of outcomes recorded so far.
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// Outcomes sorted by their position in the input list.
    pub fn outcomes_in_input_order(&self) -> Vec<&ConversionOutcome> {
        let mut sorted: Vec<&ConversionOutcome> = self.outcomes.iter().collect();
        sorted.sort_by_key(|o| o.sequence_index);
        sorted
    }

    /// Rebuild `failures` from the recorded outcomes, in input order.
    pub(crate) fn finalize(&mut self, total_duration_ms: u64) {
        self.failures = self
            .outcomes_in_input_order()
            .into_iter()
            .filter(|o| !o.succeeded)
            .map(|o| FailedConversion {
                url: o.url.clone(),
                error: o.error.clone().unwrap_or_else(|| "Unknown error".to_string()),
            })
            .collect();
        self.total_duration_ms = total_duration_ms;
    }
}
