//! The learning loop.
//!
//! A recurring background process that turns user feedback into
//! relevance-weighted memory records and distills aggregate insights per
//! worker. Worker processing is fan-out with isolated failure: one
//! worker's error lands in [`CycleSummary::errors`] and never stops the
//! others.

mod analytics;
mod feedback;

pub use analytics::{Analytics, UsageReport, WorkerReport};
pub use feedback::FeedbackProcessor;

use crate::config::LearningConfig;
use crate::llm::LlmProvider;
use crate::memory::{MemoryStore, RelevanceSignals};
use crate::models::{CycleError, CycleSummary, MemoryKind, MemoryQuery, WorkerCycle};
use crate::Result;
use crate::storage::{FeedbackBackend, TaskBackend};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

const SECONDS_PER_DAY: u64 = 86_400;

/// Relevance assigned to aggregate insight records.
const INSIGHT_RELEVANCE: f64 = 0.9;

/// System prompt for aggregate insight generation.
const INSIGHT_SYSTEM_PROMPT: &str = "\
You analyze feedback patterns for an AI worker and produce learning \
insights: performance trends, recurring improvement areas, optimization \
recommendations, and success patterns to reinforce. Respond with a \
concise prose summary.";

/// Runs learning cycles across workers.
pub struct LearningLoop {
    memory: MemoryStore,
    feedback: Arc<dyn FeedbackBackend>,
    tasks: Arc<dyn TaskBackend>,
    processor: FeedbackProcessor,
    llm: Arc<dyn LlmProvider>,
    config: LearningConfig,
}

impl LearningLoop {
    /// Creates a learning loop over its collaborators.
    #[must_use]
    pub fn new(
        memory: MemoryStore,
        feedback: Arc<dyn FeedbackBackend>,
        tasks: Arc<dyn TaskBackend>,
        llm: Arc<dyn LlmProvider>,
        config: LearningConfig,
    ) -> Self {
        Self {
            memory,
            feedback,
            tasks,
            processor: FeedbackProcessor::new(Arc::clone(&llm)),
            llm,
            config,
        }
    }

    /// Runs one learning cycle.
    ///
    /// With a worker name, processes only that worker; otherwise discovers
    /// every worker with activity inside the configured window and
    /// processes each independently. Safe to invoke repeatedly: the
    /// feedback/record count comparison makes processing idempotent.
    #[instrument(name = "foreman.learning.cycle", skip(self))]
    pub fn run_cycle(&self, worker_name: Option<&str>) -> CycleSummary {
        let start = Instant::now();
        let started_at = crate::current_timestamp();
        let since =
            started_at.saturating_sub(u64::from(self.config.activity_window_days) * SECONDS_PER_DAY);

        let mut summary = CycleSummary {
            started_at,
            ..Default::default()
        };

        let workers = match worker_name {
            Some(name) => vec![name.to_string()],
            None => match self.tasks.active_workers(since) {
                Ok(workers) => workers,
                Err(e) => {
                    warn!(error = %e, "Failed to discover active workers");
                    summary.errors.push(CycleError {
                        worker_name: "*".to_string(),
                        message: e.to_string(),
                    });
                    Vec::new()
                },
            },
        };

        for worker in workers {
            match self.process_worker(&worker, since) {
                Ok(cycle) => {
                    summary.feedback_processed += cycle.feedback_processed;
                    if cycle.insight_generated {
                        summary.insights_generated += 1;
                    }
                    summary.workers.push(cycle);
                },
                Err(e) => {
                    warn!(worker = %worker, error = %e, "Worker learning cycle failed");
                    summary.errors.push(CycleError {
                        worker_name: worker,
                        message: e.to_string(),
                    });
                },
            }
        }

        summary.completed_at = crate::current_timestamp();
        summary.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        metrics::counter!("learning_cycles_total").increment(1);
        metrics::gauge!("learning_feedback_processed")
            .set(f64::from(u32::try_from(summary.feedback_processed).unwrap_or(u32::MAX)));
        info!(summary = %summary.summary(), "Learning cycle completed");

        summary
    }

    /// Processes one worker's unprocessed feedback.
    fn process_worker(&self, worker_name: &str, since: u64) -> Result<WorkerCycle> {
        let requests = self.tasks.requests_for_worker(worker_name, since)?;

        let mut feedback_processed = 0;
        for request_id in &requests {
            // Idempotency check: only requests with strictly more feedback
            // than stored feedback-kind records have unprocessed items.
            let feedback_count = self.feedback.feedback_count_for_request(request_id)?;
            let record_count = self.memory.backend().feedback_record_count(request_id)?;
            if feedback_count <= record_count {
                continue;
            }

            for item in self.feedback.unprocessed_for_request(request_id)? {
                if item.processed {
                    continue;
                }

                let insights = self.processor.process(&item);
                let content = serde_json::json!({
                    "request_id": item.request_id,
                    "rating": item.rating,
                    "comment": item.comment,
                    "insights": insights,
                });
                let relevance = RelevanceSignals::default()
                    .with_sentiment(insights.sentiment)
                    .with_content(&content)
                    .score();

                match self.memory.store(
                    worker_name,
                    MemoryKind::Feedback,
                    content,
                    vec![
                        "feedback".to_string(),
                        "user_input".to_string(),
                        worker_name.to_string(),
                    ],
                    relevance,
                ) {
                    Ok(_) => {
                        // Marked processed only after the record landed, so
                        // a failed store is retried on the next cycle.
                        if let Err(e) = self.feedback.mark_processed(&item.id) {
                            warn!(feedback_id = %item.id, error = %e, "Failed to mark feedback processed");
                        }
                        feedback_processed += 1;
                    },
                    Err(e) => {
                        warn!(feedback_id = %item.id, error = %e, "Failed to store feedback record");
                    },
                }
            }
        }

        // Aggregate insight across recent + historical feedback.
        // Best-effort: a failed reasoning call is logged and skipped.
        let insight_generated = if feedback_processed > 0 {
            self.generate_insight(worker_name)
        } else {
            false
        };

        Ok(WorkerCycle {
            worker_name: worker_name.to_string(),
            requests_reviewed: requests.len(),
            feedback_processed,
            insight_generated,
        })
    }

    /// Distills one aggregate insight record from stored feedback.
    fn generate_insight(&self, worker_name: &str) -> bool {
        let history = self.memory.retrieve(
            &MemoryQuery::for_worker(worker_name)
                .with_kind(MemoryKind::Feedback)
                .with_limit(self.config.history_limit),
        );
        if history.is_empty() {
            return false;
        }

        let feedback_digest: Vec<&serde_json::Value> =
            history.iter().map(|r| &r.content).collect();
        let user = format!(
            "Worker: {worker_name}\nFeedback records ({}):\n{}",
            history.len(),
            serde_json::to_string(&feedback_digest).unwrap_or_default()
        );

        match self.llm.complete_with_system(INSIGHT_SYSTEM_PROMPT, &user) {
            Ok(insight) => {
                let content = serde_json::json!({
                    "insight": insight,
                    "feedback_count": history.len(),
                });
                self.memory
                    .store(
                        worker_name,
                        MemoryKind::Insight,
                        content,
                        vec![
                            "learning".to_string(),
                            "insights".to_string(),
                            "improvement".to_string(),
                        ],
                        INSIGHT_RELEVANCE,
                    )
                    .map_err(|e| {
                        warn!(worker = %worker_name, error = %e, "Failed to store insight record");
                        e
                    })
                    .is_ok()
            },
            Err(e) => {
                warn!(worker = %worker_name, error = %e, "Insight generation skipped");
                false
            },
        }
    }
}
