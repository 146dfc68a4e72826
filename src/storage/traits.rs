//! Storage backend traits.
//!
//! The core depends only on these semantics; any store offering them can
//! back foreman. Three concerns, three traits:
//!
//! | Trait | Concern |
//! |-------|---------|
//! | [`MemoryBackend`] | Memory records: append, filtered sorted query, decay updates |
//! | [`FeedbackBackend`] | Feedback items and the idempotency counts |
//! | [`TaskBackend`] | Request/subtask persistence and worker activity stats |
//!
//! # Implementor Notes
//!
//! - Methods use `&self` to enable sharing via `Arc<dyn ...>`
//! - Use interior mutability (e.g., `Mutex<Connection>`) for mutable state
//! - Writes are append-only except decay updates and subtask status; a
//!   relevance update must be a whole-value write (readers may observe the
//!   pre- or post-decay value, never a torn one)

use crate::Result;
use crate::models::{FeedbackItem, MemoryKind, MemoryQuery, MemoryRecord, RecordId, Subtask, WorkRequest};

/// Rolling execution statistics for one worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// The worker these statistics belong to.
    pub worker_name: String,
    /// Total recorded executions.
    pub total_executions: u64,
    /// Executions that completed successfully.
    pub successful_executions: u64,
    /// Cumulative execution time in milliseconds.
    pub total_duration_ms: u64,
    /// Timestamp of the most recent execution (Unix epoch seconds).
    pub last_execution_at: Option<u64>,
}

impl WorkerStats {
    /// Rolling average execution time in milliseconds.
    #[must_use]
    pub fn average_duration_ms(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            let total = u32::try_from(self.total_duration_ms).unwrap_or(u32::MAX);
            let count = u32::try_from(self.total_executions).unwrap_or(u32::MAX);
            f64::from(total) / f64::from(count)
        }
    }

    /// Success rate in `[0.0, 1.0]`.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            let ok = u32::try_from(self.successful_executions).unwrap_or(u32::MAX);
            let count = u32::try_from(self.total_executions).unwrap_or(u32::MAX);
            f64::from(ok) / f64::from(count)
        }
    }
}

/// Windowed per-worker usage numbers for analytics.
#[derive(Debug, Clone, Default)]
pub struct WorkerUsage {
    /// The worker these numbers belong to.
    pub worker_name: String,
    /// Subtasks assigned in the window.
    pub total_subtasks: u64,
    /// Subtasks that completed.
    pub completed: u64,
    /// Subtasks that failed.
    pub failed: u64,
    /// Average execution time over completed subtasks, milliseconds.
    pub avg_duration_ms: f64,
}

/// Backend for the durable memory log.
pub trait MemoryBackend: Send + Sync {
    /// Appends a memory record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn insert(&self, record: &MemoryRecord) -> Result<()>;

    /// Queries records matching the filter, sorted by
    /// `(relevance desc, created_at desc)`, capped at `query.limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&self, query: &MemoryQuery) -> Result<Vec<MemoryRecord>>;

    /// Bumps `last_accessed_at` and `access_count` for the given records.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn touch(&self, ids: &[RecordId], now: u64) -> Result<()>;

    /// Overwrites a record's relevance score.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn set_relevance(&self, id: &RecordId, relevance: f64) -> Result<()>;

    /// Counts stale records per kind without deleting them.
    ///
    /// A record is stale when it is older than `cutoff_ts` **and** its
    /// relevance is below `min_relevance` — both conditions required.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn stale_counts(&self, cutoff_ts: u64, min_relevance: f64) -> Result<Vec<(MemoryKind, usize)>>;

    /// Deletes stale records (same conjunction as [`Self::stale_counts`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_stale(&self, cutoff_ts: u64, min_relevance: f64) -> Result<usize>;

    /// Lists records created at or after `cutoff_ts` (decay candidates).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_decayable(&self, cutoff_ts: u64) -> Result<Vec<MemoryRecord>>;

    /// Counts all records for a worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn count_for_worker(&self, worker_name: &str) -> Result<usize>;

    /// Counts `feedback`-kind records tied to a request.
    ///
    /// Compared against the raw feedback count for the idempotency check.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn feedback_record_count(&self, request_id: &str) -> Result<usize>;
}

/// Backend for user feedback items.
pub trait FeedbackBackend: Send + Sync {
    /// Stores a feedback item.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn add_feedback(&self, item: &FeedbackItem) -> Result<()>;

    /// Counts all feedback items tied to a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn feedback_count_for_request(&self, request_id: &str) -> Result<usize>;

    /// Fetches feedback items for a request that are not yet processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn unprocessed_for_request(&self, request_id: &str) -> Result<Vec<FeedbackItem>>;

    /// Marks one feedback item processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn mark_processed(&self, id: &str) -> Result<()>;

    /// Average rating for a worker since `since` (None without feedback).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn average_rating_for_worker(&self, worker_name: &str, since: u64) -> Result<Option<f64>>;
}

/// Backend for request/subtask persistence and worker activity.
pub trait TaskBackend: Send + Sync {
    /// Persists an incoming request.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn record_request(&self, request: &WorkRequest) -> Result<()>;

    /// Persists the decomposed subtask list before execution begins.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn record_subtasks(&self, request_id: &str, subtasks: &[Subtask]) -> Result<()>;

    /// Updates a subtask's status/result after execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn update_subtask(&self, request_id: &str, subtask: &Subtask) -> Result<()>;

    /// Folds one execution into the worker's rolling statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn record_execution(&self, worker_name: &str, success: bool, duration_ms: u64, now: u64)
    -> Result<()>;

    /// Fetches a worker's rolling statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn worker_stats(&self, worker_name: &str) -> Result<Option<WorkerStats>>;

    /// Names of workers with executions at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn active_workers(&self, since: u64) -> Result<Vec<String>>;

    /// Request ids a worker completed subtasks for at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn requests_for_worker(&self, worker_name: &str, since: u64) -> Result<Vec<String>>;

    /// Per-worker usage numbers for subtasks started at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn usage_counts(&self, since: u64) -> Result<Vec<WorkerUsage>>;
}
