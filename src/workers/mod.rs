//! Worker contract and registry.
//!
//! A worker is a named unit that executes one subtask given a context.
//! Workers are opaque to the orchestrator beyond this contract: a name,
//! a capability list, and `execute`.

mod builtin;
mod registry;

pub use builtin::{LlmWorker, register_builtin_workers};
pub use registry::{WorkerDescriptor, WorkerRegistry};

use crate::Result;
use crate::models::{MemoryRecord, Priority};

/// A named unit capable of executing one subtask.
pub trait Worker: Send + Sync {
    /// The worker's unique name (registry key).
    fn name(&self) -> &str;

    /// Short human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Capability tags this worker advertises.
    fn capabilities(&self) -> &[String];

    /// Executes one subtask.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails; the orchestrator records it on
    /// the subtask and continues with siblings.
    fn execute(&self, context: &WorkerContext) -> Result<WorkerOutcome>;
}

impl std::fmt::Debug for dyn Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Context passed to a worker for one execution.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// The owning request id.
    pub request_id: String,
    /// The instruction text for this subtask.
    pub query: String,
    /// Request priority.
    pub priority: Priority,
    /// Results of completed dependency subtasks, keyed by subtask id.
    pub prior_results: serde_json::Map<String, serde_json::Value>,
    /// The most relevant memory records for this worker, if any.
    pub memory_hits: Vec<MemoryRecord>,
}

impl WorkerContext {
    /// Creates a context for a query.
    #[must_use]
    pub fn new(request_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            query: query.into(),
            priority: Priority::Medium,
            prior_results: serde_json::Map::new(),
            memory_hits: Vec::new(),
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches prior subtask results.
    #[must_use]
    pub fn with_prior_results(
        mut self,
        prior_results: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.prior_results = prior_results;
        self
    }

    /// Attaches memory hits.
    #[must_use]
    pub fn with_memory_hits(mut self, memory_hits: Vec<MemoryRecord>) -> Self {
        self.memory_hits = memory_hits;
        self
    }
}

/// Result of one worker execution.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    /// Structured output payload.
    pub data: serde_json::Value,
    /// Short human-readable completion message.
    pub message: String,
}

impl WorkerOutcome {
    /// Creates an outcome.
    #[must_use]
    pub fn new(data: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
        }
    }
}
