//! User feedback types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A user-supplied rating tied to a completed request.
///
/// Processed at most once: the learning loop checks `processed` (and the
/// per-request feedback/record count comparison) before converting an item
/// into a memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Unique identifier.
    pub id: String,
    /// The request this feedback rates.
    pub request_id: String,
    /// The worker the rated request was handled by.
    pub worker_name: String,
    /// Rating on a 1–5 scale.
    pub rating: u8,
    /// Optional free-text comment.
    pub comment: Option<String>,
    /// Whether the learning loop has converted this item already.
    pub processed: bool,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
}

/// Sentiment classification of a feedback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    /// Rating ≥ 4 under the fallback rule.
    Positive,
    /// Rating ≤ 2 under the fallback rule.
    Negative,
    /// Everything in between.
    Neutral,
}

impl Sentiment {
    /// Returns the sentiment as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    /// Parses a sentiment string; unknown values map to `Neutral`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured insight extracted from one feedback item.
///
/// Either produced by the reasoning call or by the deterministic fallback
/// when the call fails or returns malformed JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFeedback {
    /// Overall sentiment.
    pub sentiment: Sentiment,
    /// Areas the worker should improve in.
    #[serde(default)]
    pub improvement_areas: Vec<String>,
    /// Actionable recommendations.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// How urgently the feedback should be acted on.
    pub priority: super::Priority,
    /// Category labels (quality, performance, usability, content).
    #[serde(default)]
    pub categories: Vec<String>,
    /// Confidence of the analysis in `[0.0, 1.0]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

const fn default_confidence() -> f64 {
    0.5
}

impl ProcessedFeedback {
    /// Deterministic fallback analysis used when the reasoning call fails.
    ///
    /// Sentiment from rating thresholds (≥ 4 positive, ≤ 2 negative, else
    /// neutral); priority ≤ 2 high, = 3 medium, else low.
    #[must_use]
    pub fn fallback_from_rating(rating: u8) -> Self {
        let sentiment = if rating >= 4 {
            Sentiment::Positive
        } else if rating <= 2 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };
        let priority = if rating <= 2 {
            super::Priority::High
        } else if rating == 3 {
            super::Priority::Medium
        } else {
            super::Priority::Low
        };
        let improvement_areas = if rating < 4 {
            vec!["general_improvement".to_string()]
        } else {
            Vec::new()
        };

        Self {
            sentiment,
            improvement_areas,
            recommendations: vec!["Review and improve based on user comments".to_string()],
            priority,
            categories: vec!["quality".to_string()],
            confidence: 0.5,
        }
    }
}
