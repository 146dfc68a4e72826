//! Usage analytics.
//!
//! Read-only aggregation of per-worker activity: subtask counts, success
//! rates, execution times, feedback ratings, and memory footprint, rolled
//! into a composite performance score with top-performer and
//! needs-improvement buckets. Idempotent and safe to run concurrently
//! with request handling.

use crate::Result;
use crate::storage::{FeedbackBackend, MemoryBackend, TaskBackend};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

const SECONDS_PER_DAY: u64 = 86_400;

/// A fast execution is one averaging under this many milliseconds.
const FAST_EXECUTION_MS: f64 = 30_000.0;

/// Performance score at or above this marks a top performer.
const TOP_PERFORMER_SCORE: f64 = 0.8;

/// Performance score below this marks a worker needing improvement.
const IMPROVEMENT_SCORE: f64 = 0.6;

/// System-level warning threshold for the overall failure rate.
const FAILURE_RATE_WARNING: f64 = 0.1;

/// System-level warning threshold for average satisfaction.
const SATISFACTION_WARNING: f64 = 3.5;

/// Per-worker analytics entry.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    /// The worker this entry describes.
    pub worker_name: String,
    /// Subtasks assigned in the window.
    pub total_subtasks: u64,
    /// Subtasks completed.
    pub completed: u64,
    /// Subtasks failed.
    pub failed: u64,
    /// Completion rate in `[0.0, 1.0]`.
    pub success_rate: f64,
    /// Average execution time over completed subtasks, milliseconds.
    pub avg_duration_ms: f64,
    /// Average feedback rating in the window, if any feedback exists.
    pub avg_rating: Option<f64>,
    /// Total memory records stored for this worker.
    pub memory_records: usize,
    /// Composite performance score in `[0.0, 1.0]`.
    pub performance_score: f64,
}

/// Aggregated usage report across all active workers.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    /// Window size in days.
    pub window_days: u32,
    /// Report generation time (UTC).
    pub generated_at: DateTime<Utc>,
    /// Per-worker entries, sorted by name.
    pub workers: Vec<WorkerReport>,
    /// Workers scoring at or above the top-performer threshold.
    pub top_performers: Vec<String>,
    /// Workers scoring below the improvement threshold.
    pub needs_improvement: Vec<String>,
    /// System-level recommendations.
    pub recommendations: Vec<String>,
}

/// Computes usage reports from the storage backends.
pub struct Analytics {
    tasks: Arc<dyn TaskBackend>,
    feedback: Arc<dyn FeedbackBackend>,
    memory: Arc<dyn MemoryBackend>,
}

impl Analytics {
    /// Creates an analytics aggregator.
    #[must_use]
    pub fn new(
        tasks: Arc<dyn TaskBackend>,
        feedback: Arc<dyn FeedbackBackend>,
        memory: Arc<dyn MemoryBackend>,
    ) -> Self {
        Self {
            tasks,
            feedback,
            memory,
        }
    }

    /// Builds the usage report for the trailing window.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backends fail.
    #[instrument(name = "foreman.learning.analytics", skip(self))]
    pub fn usage_report(&self, window_days: u32) -> Result<UsageReport> {
        let now = crate::current_timestamp();
        let since = now.saturating_sub(u64::from(window_days) * SECONDS_PER_DAY);

        let mut workers = Vec::new();
        for usage in self.tasks.usage_counts(since)? {
            let success_rate = if usage.total_subtasks == 0 {
                0.0
            } else {
                ratio(usage.completed, usage.total_subtasks)
            };
            let avg_rating = self
                .feedback
                .average_rating_for_worker(&usage.worker_name, since)?;
            let memory_records = self.memory.count_for_worker(&usage.worker_name)?;

            let performance_score = performance_score(success_rate, avg_rating, usage.avg_duration_ms);

            workers.push(WorkerReport {
                worker_name: usage.worker_name,
                total_subtasks: usage.total_subtasks,
                completed: usage.completed,
                failed: usage.failed,
                success_rate,
                avg_duration_ms: usage.avg_duration_ms,
                avg_rating,
                memory_records,
                performance_score,
            });
        }

        let top_performers = workers
            .iter()
            .filter(|w| w.performance_score >= TOP_PERFORMER_SCORE)
            .map(|w| w.worker_name.clone())
            .collect();
        let needs_improvement = workers
            .iter()
            .filter(|w| w.performance_score < IMPROVEMENT_SCORE)
            .map(|w| w.worker_name.clone())
            .collect();
        let recommendations = system_recommendations(&workers);

        metrics::gauge!("analytics_workers_reported").set(workers_gauge(workers.len()));

        Ok(UsageReport {
            window_days,
            generated_at: Utc::now(),
            workers,
            top_performers,
            needs_improvement,
            recommendations,
        })
    }
}

/// Composite performance score.
///
/// Success rate and user rating weigh 40% each; fast average execution
/// contributes the remaining 20% (half credit when slow). Workers without
/// feedback are scored on the other signals alone.
fn performance_score(success_rate: f64, avg_rating: Option<f64>, avg_duration_ms: f64) -> f64 {
    let rating_component = avg_rating.map_or(0.0, |r| (r / 5.0).clamp(0.0, 1.0));
    let speed_component: f64 = if avg_duration_ms > 0.0 && avg_duration_ms < FAST_EXECUTION_MS {
        1.0
    } else {
        0.5
    };
    speed_component.mul_add(0.2, success_rate.mul_add(0.4, rating_component * 0.4))
}

/// System-level recommendations derived from the aggregate numbers.
fn system_recommendations(workers: &[WorkerReport]) -> Vec<String> {
    let mut recommendations = Vec::new();

    let total: u64 = workers.iter().map(|w| w.total_subtasks).sum();
    let failed: u64 = workers.iter().map(|w| w.failed).sum();
    if total > 0 {
        let failure_rate = ratio(failed, total);
        if failure_rate > FAILURE_RATE_WARNING {
            recommendations.push(format!(
                "High system failure rate ({:.1}%). Review error handling and provider reliability.",
                failure_rate * 100.0
            ));
        }
    }

    let ratings: Vec<f64> = workers.iter().filter_map(|w| w.avg_rating).collect();
    if !ratings.is_empty() {
        let avg = ratings.iter().sum::<f64>() / usize_f64(ratings.len());
        if avg < SATISFACTION_WARNING {
            recommendations.push(
                "Overall user satisfaction is below target. Focus on quality improvements."
                    .to_string(),
            );
        }
    }

    recommendations
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    let n = u32::try_from(numerator).unwrap_or(u32::MAX);
    let d = u32::try_from(denominator).unwrap_or(u32::MAX).max(1);
    f64::from(n) / f64::from(d)
}

fn usize_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

fn workers_gauge(count: usize) -> f64 {
    usize_f64(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedbackItem, Priority, Subtask, WorkRequest};
    use crate::storage::{SqliteStore, TaskBackend};

    fn seeded_store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::in_memory().expect("store"));
        let request = WorkRequest {
            id: "req_1".to_string(),
            query: "q".to_string(),
            kind: None,
            priority: Priority::Medium,
            created_at: crate::current_timestamp(),
        };
        store.record_request(&request).expect("request");

        let now = crate::current_timestamp();
        let mut ok = Subtask::new("subtask_1", "research", "gather", 1);
        ok.mark_running(now - 5);
        ok.mark_completed(serde_json::json!({}), now - 3);
        let mut bad = Subtask::new("subtask_2", "content", "write", 2);
        bad.mark_running(now - 5);
        bad.mark_failed(crate::models::FailureReason::ExecutionError, "boom", now - 4);
        store
            .record_subtasks("req_1", &[ok.clone(), bad.clone()])
            .expect("subtasks");
        store.update_subtask("req_1", &ok).expect("update");
        store.update_subtask("req_1", &bad).expect("update");

        store
            .add_feedback(&FeedbackItem {
                id: "fb1".to_string(),
                request_id: "req_1".to_string(),
                worker_name: "research".to_string(),
                rating: 5,
                comment: None,
                processed: false,
                created_at: now,
            })
            .expect("feedback");
        store
    }

    fn analytics(store: &Arc<SqliteStore>) -> Analytics {
        Analytics::new(
            Arc::<SqliteStore>::clone(store),
            Arc::<SqliteStore>::clone(store),
            Arc::<SqliteStore>::clone(store),
        )
    }

    #[test]
    fn test_report_buckets_workers() {
        let store = seeded_store();
        let report = analytics(&store).usage_report(30).expect("report");

        assert_eq!(report.workers.len(), 2);
        let research = report
            .workers
            .iter()
            .find(|w| w.worker_name == "research")
            .expect("research");
        assert!((research.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(research.avg_rating, Some(5.0));
        // 1.0*0.4 + 1.0*0.4 + 1.0*0.2 = 1.0
        assert!(report.top_performers.contains(&"research".to_string()));

        let content = report
            .workers
            .iter()
            .find(|w| w.worker_name == "content")
            .expect("content");
        assert!((content.success_rate - 0.0).abs() < f64::EPSILON);
        assert!(report.needs_improvement.contains(&"content".to_string()));
    }

    #[test]
    fn test_high_failure_rate_recommendation() {
        let store = seeded_store();
        let report = analytics(&store).usage_report(30).expect("report");
        // 1 of 2 subtasks failed: 50% failure rate.
        assert!(
            report
                .recommendations
                .iter()
                .any(|r| r.contains("failure rate"))
        );
    }

    #[test]
    fn test_performance_score_without_feedback() {
        // No rating: scored on success rate and speed only.
        let score = performance_score(1.0, None, 1_000.0);
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_performance_score_slow_worker_gets_half_speed_credit() {
        let score = performance_score(1.0, Some(5.0), 60_000.0);
        assert!((score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_is_empty_report() {
        let store = Arc::new(SqliteStore::in_memory().expect("store"));
        let report = analytics(&store).usage_report(30).expect("report");
        assert!(report.workers.is_empty());
        assert!(report.recommendations.is_empty());
    }
}
