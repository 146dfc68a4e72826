//! Request and compiled-result types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority scale shared by requests, subtasks, and feedback insights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Needs attention first.
    High,
    /// Normal priority.
    #[default]
    Medium,
    /// Can wait.
    Low,
}

impl Priority {
    /// Returns the priority as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parses a priority string; unknown values map to `Medium`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complexity estimate produced by request analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Single-step request.
    Simple,
    /// A handful of subtasks.
    #[default]
    Moderate,
    /// Many subtasks or deep dependencies.
    Complex,
}

/// A user request entering the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest {
    /// Unique request identifier.
    pub id: String,
    /// The natural-language query.
    pub query: String,
    /// Optional caller-supplied kind hint (e.g. `research`).
    pub kind: Option<String>,
    /// Request priority.
    pub priority: Priority,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
}

impl WorkRequest {
    /// Creates a request with a fresh id and default priority.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: format!("req_{}", uuid::Uuid::new_v4()),
            query: query.into(),
            kind: None,
            priority: Priority::Medium,
            created_at: crate::current_timestamp(),
        }
    }

    /// Sets the kind hint.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Structured classification of a request's intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Primary task kind (`research`, `analysis`, `content`, ... or `general`).
    #[serde(alias = "task_type")]
    pub kind: String,
    /// Capabilities the request needs.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Complexity estimate.
    #[serde(default)]
    pub complexity: Complexity,
    /// Kinds of subtasks the decomposition should produce.
    #[serde(default)]
    pub subtask_kinds: Vec<String>,
}

impl Classification {
    /// Deterministic fallback used when the analysis call fails.
    ///
    /// Analysis failure is never fatal; the request degrades to its kind
    /// hint or `general`.
    #[must_use]
    pub fn fallback(request: &WorkRequest) -> Self {
        let kind = request.kind.clone().unwrap_or_else(|| "general".to_string());
        Self {
            capabilities: vec!["general".to_string()],
            complexity: Complexity::Moderate,
            subtask_kinds: vec![kind.clone()],
            kind,
        }
    }
}

/// Per-subtask entry within a compiled result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskReport {
    /// Subtask identifier.
    pub subtask_id: String,
    /// Worker the subtask was assigned to.
    pub worker_name: String,
    /// Terminal status string (`completed` or `failed`).
    pub status: String,
    /// Result payload for completed subtasks.
    pub data: Option<serde_json::Value>,
    /// Error detail for failed subtasks.
    pub error: Option<String>,
}

/// The merged outcome of one handled request.
///
/// Always produced, even when every subtask failed; partial failure is
/// reported, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledResult {
    /// The request this result belongs to.
    pub request_id: String,
    /// Human-readable execution summary.
    pub summary: String,
    /// Number of subtasks that completed.
    pub completed: usize,
    /// Number of subtasks that failed.
    pub failed: usize,
    /// Total number of subtasks.
    pub total: usize,
    /// `true` when at least one subtask failed.
    pub partial_failure: bool,
    /// Per-subtask detail, in execution order.
    pub reports: Vec<SubtaskReport>,
    /// Wall-clock handling time in milliseconds.
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::parse("high"), Priority::High);
        assert_eq!(Priority::parse("LOW"), Priority::Low);
        assert_eq!(Priority::parse("whatever"), Priority::Medium);
    }

    #[test]
    fn test_request_builder() {
        let request = WorkRequest::new("write a launch post")
            .with_kind("content")
            .with_priority(Priority::High);
        assert!(request.id.starts_with("req_"));
        assert_eq!(request.kind.as_deref(), Some("content"));
        assert_eq!(request.priority, Priority::High);
    }

    #[test]
    fn test_classification_fallback_uses_kind_hint() {
        let request = WorkRequest::new("competitor pricing").with_kind("research");
        let classification = Classification::fallback(&request);
        assert_eq!(classification.kind, "research");
        assert_eq!(classification.subtask_kinds, vec!["research".to_string()]);
        assert_eq!(classification.capabilities, vec!["general".to_string()]);
    }

    #[test]
    fn test_classification_fallback_defaults_to_general() {
        let request = WorkRequest::new("do something");
        assert_eq!(Classification::fallback(&request).kind, "general");
    }

    #[test]
    fn test_classification_accepts_task_type_alias() {
        let parsed: Classification =
            serde_json::from_str(r#"{"task_type": "research", "capabilities": ["web_search"]}"#)
                .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(parsed.kind, "research");
    }
}
