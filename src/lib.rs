//! # Foreman
//!
//! A self-improving request orchestrator for specialized AI workers.
//!
//! Foreman turns one natural-language request into an ordered set of
//! subtasks, dispatches each subtask to a named worker, and remembers how
//! every execution went. Memories carry a decaying relevance score and are
//! served back to a worker before it runs; a background learning loop
//! converts user feedback into insight records and prunes stale memory.
//!
//! ## Architecture
//!
//! - [`workers`] — the [`Worker`] contract and the [`WorkerRegistry`]
//! - [`memory`] — the [`MemoryStore`] with write-time relevance scoring
//!   and the periodic decay sweep
//! - [`orchestrator`] — analyze → decompose → execute → compile
//! - [`learning`] — the feedback-driven learning cycle and usage analytics
//! - [`scheduler`] — fixed-interval background jobs with single-flight
//!   guarantees and retry backoff
//!
//! ## Example
//!
//! ```rust,ignore
//! use foreman::app::AppContext;
//! use foreman::config::ForemanConfig;
//! use foreman::models::WorkRequest;
//!
//! let ctx = AppContext::new(ForemanConfig::load_default()?)?;
//! let result = ctx.orchestrator.handle(&WorkRequest::new("summarize Q3 revenue drivers"))?;
//! println!("{}", result.summary);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod app;
pub mod config;
pub mod learning;
pub mod llm;
pub mod memory;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod scheduler;
pub mod storage;
pub mod workers;

// Re-exports for convenience
pub use config::ForemanConfig;
pub use learning::LearningLoop;
pub use llm::LlmProvider;
pub use memory::{DecayConfig, DecayReport, DecaySweep, MemoryStore};
pub use models::{
    CompiledResult, CycleSummary, FeedbackItem, MemoryKind, MemoryQuery, MemoryRecord, Priority,
    RecordId, Sentiment, Subtask, SubtaskStatus, WorkRequest,
};
pub use orchestrator::Orchestrator;
pub use workers::{Worker, WorkerContext, WorkerOutcome, WorkerRegistry};

/// Error type for foreman operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Missing required parameters, empty queries, malformed configuration |
/// | `OperationFailed` | I/O errors, database failures, LLM transport failures |
/// | `WorkerNotFound` | Registry lookup for a name no worker registered under |
/// | `PlanInvariant` | A subtask plan that cannot be repaired (dependency cycle) |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A request query is empty
    /// - A rating is outside the 1–5 scale
    /// - A configuration file fails to parse
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` operations fail
    /// - An LLM provider returns a transport or API error
    /// - The response payload cannot be decoded
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// No worker is registered under the requested name.
    ///
    /// This is an expected condition on the request path: the orchestrator
    /// marks the affected subtask failed and continues with its siblings.
    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    /// A subtask plan violated an invariant that could not be repaired.
    ///
    /// The only condition that aborts request handling entirely. Currently
    /// raised for dependency cycles surviving plan normalization.
    #[error("subtask plan invariant violated: {0}")]
    PlanInvariant(String),
}

/// Result type alias for foreman operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized to avoid duplicate implementations across the codebase.
/// Uses `SystemTime::now()` with fallback to 0 if the system clock is
/// before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use foreman::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
