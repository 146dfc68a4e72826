//! Subtask types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskStatus {
    /// Created but not yet started.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished unsuccessfully. Terminal.
    Failed,
}

impl SubtaskStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status string; unknown values map to `Pending`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Returns `true` if the status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a subtask failed without (or despite) executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// A declared dependency did not reach `Completed`.
    DependencyFailed,
    /// No worker is registered under the subtask's worker name.
    WorkerUnavailable,
    /// The worker executed and reported an error.
    ExecutionError,
}

impl FailureReason {
    /// Returns the reason as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DependencyFailed => "dependency_failed",
            Self::WorkerUnavailable => "worker_unavailable",
            Self::ExecutionError => "execution_error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of delegated work within a request.
///
/// Created by decomposition, mutated by the execution loop, terminal once
/// `Completed` or `Failed`. The core never deletes subtasks; retention
/// belongs to the owning request record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Identifier unique within the owning request (`subtask_1`, ...).
    pub id: String,
    /// Name of the worker this subtask is assigned to.
    pub worker_name: String,
    /// Instruction text passed to the worker.
    pub description: String,
    /// Ids of subtasks that must complete before this one may run.
    pub depends_on: Vec<String>,
    /// Execution rank. Total order, consistent with `depends_on`.
    pub order: u32,
    /// Current lifecycle state.
    pub status: SubtaskStatus,
    /// Opaque result payload once executed.
    pub result: Option<serde_json::Value>,
    /// Failure classification, if failed.
    pub failure_reason: Option<FailureReason>,
    /// Error detail, if failed.
    pub error: Option<String>,
    /// Execution start timestamp (Unix epoch seconds).
    pub started_at: Option<u64>,
    /// Execution end timestamp (Unix epoch seconds).
    pub completed_at: Option<u64>,
}

impl Subtask {
    /// Creates a pending subtask.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        worker_name: impl Into<String>,
        description: impl Into<String>,
        order: u32,
    ) -> Self {
        Self {
            id: id.into(),
            worker_name: worker_name.into(),
            description: description.into(),
            depends_on: Vec::new(),
            order,
            status: SubtaskStatus::Pending,
            result: None,
            failure_reason: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Declares a dependency on another subtask id.
    #[must_use]
    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    /// Transitions to `Running` and stamps the start time.
    pub fn mark_running(&mut self, now: u64) {
        self.status = SubtaskStatus::Running;
        self.started_at = Some(now);
    }

    /// Transitions to `Completed` with a result payload.
    pub fn mark_completed(&mut self, result: serde_json::Value, now: u64) {
        self.status = SubtaskStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(now);
    }

    /// Transitions to `Failed` with a reason and detail message.
    pub fn mark_failed(&mut self, reason: FailureReason, error: impl Into<String>, now: u64) {
        self.status = SubtaskStatus::Failed;
        self.failure_reason = Some(reason);
        self.error = Some(error.into());
        self.completed_at = Some(now);
    }
}
