//! Memory record types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a memory record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a new record ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kinds of facts the system learns about a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// A completed execution outcome.
    Success,
    /// A failed execution outcome.
    Error,
    /// A processed user-feedback item.
    Feedback,
    /// An aggregate insight distilled across feedback.
    Insight,
}

impl MemoryKind {
    /// Returns all kind variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Success, Self::Error, Self::Feedback, Self::Insight]
    }

    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Feedback => "feedback",
            Self::Insight => "insight",
        }
    }

    /// Parses a kind string; unknown values map to `Success`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "feedback" => Self::Feedback,
            "insight" => Self::Insight,
            _ => Self::Success,
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted fact about a worker with a decaying relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier.
    pub id: RecordId,
    /// The worker this record belongs to.
    pub worker_name: String,
    /// What kind of fact this is.
    pub kind: MemoryKind,
    /// Structured payload (outcome summary, processed feedback, insight text).
    pub content: serde_json::Value,
    /// Tags used for conjunctive retrieval filtering.
    pub tags: Vec<String>,
    /// Relevance score in `[0.0, 1.0]`.
    ///
    /// Monotonically non-increasing once written: the decay sweep only
    /// lowers it, and a higher score for the same kind/tags arrives as a
    /// new record rather than an update.
    pub relevance: f64,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// Last retrieval timestamp (Unix epoch seconds).
    pub last_accessed_at: u64,
    /// Number of times this record was served to a worker.
    pub access_count: u64,
}

/// Filter criteria for memory retrieval.
///
/// Tag filtering is conjunctive: a record must carry every requested tag.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    /// The worker whose memory to search.
    pub worker_name: String,
    /// Optional kind filter.
    pub kind: Option<MemoryKind>,
    /// Tags the record must carry (AND logic).
    pub tags: Vec<String>,
    /// Maximum number of records to return.
    pub limit: usize,
    /// Minimum relevance score.
    pub min_relevance: f64,
}

impl MemoryQuery {
    /// Creates a query for a worker with default limit and threshold.
    #[must_use]
    pub fn for_worker(worker_name: impl Into<String>) -> Self {
        Self {
            worker_name: worker_name.into(),
            kind: None,
            tags: Vec::new(),
            limit: 10,
            min_relevance: 0.0,
        }
    }

    /// Adds a kind filter.
    #[must_use]
    pub const fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Adds a required tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replaces the required tag set.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the minimum relevance threshold.
    #[must_use]
    pub const fn with_min_relevance(mut self, min_relevance: f64) -> Self {
        self.min_relevance = min_relevance;
        self
    }
}
