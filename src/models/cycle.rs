//! Learning-cycle summary types.

use serde::{Deserialize, Serialize};

/// Per-worker outcome of one learning cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCycle {
    /// The worker that was processed.
    pub worker_name: String,
    /// Requests reviewed for unprocessed feedback.
    pub requests_reviewed: usize,
    /// Feedback items converted into memory records.
    pub feedback_processed: usize,
    /// Whether an aggregate insight record was generated.
    pub insight_generated: bool,
}

/// An isolated per-worker failure captured during a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleError {
    /// The worker whose processing failed.
    pub worker_name: String,
    /// What went wrong.
    pub message: String,
}

/// Result of one learning-loop cycle across one or more workers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Cycle start timestamp (Unix epoch seconds).
    pub started_at: u64,
    /// Cycle end timestamp (Unix epoch seconds).
    pub completed_at: u64,
    /// Per-worker outcomes.
    pub workers: Vec<WorkerCycle>,
    /// Total feedback items processed.
    pub feedback_processed: usize,
    /// Total insight records generated.
    pub insights_generated: usize,
    /// Per-worker failures; these never abort the cycle.
    pub errors: Vec<CycleError>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CycleSummary {
    /// Returns `true` when every worker processed without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns a human-readable summary of the cycle.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "processed {} workers ({} feedback items, {} insights, {} errors) in {}ms",
            self.workers.len(),
            self.feedback_processed,
            self.insights_generated,
            self.errors.len(),
            self.duration_ms
        )
    }
}
