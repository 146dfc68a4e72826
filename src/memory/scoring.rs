//! Write-time relevance scoring.
//!
//! Every new memory record is scored from the same signal set, whether it
//! comes from the request path (execution outcomes) or the learning loop
//! (processed feedback). Negative outcomes score higher: they are more
//! valuable to learn from.

/// Base score assigned to every new record.
pub const BASE_RELEVANCE: f64 = 0.7;

/// Boost for records originating from negative-sentiment feedback.
pub const NEGATIVE_SENTIMENT_BOOST: f64 = 0.2;

/// Boost for records whose content payload is substantial.
pub const SUBSTANTIAL_CONTENT_BOOST: f64 = 0.1;

/// Boost for executions faster than the worker's rolling average.
pub const FAST_EXECUTION_BOOST: f64 = 0.2;

/// Serialized content size above which a payload counts as substantial.
pub const SUBSTANTIAL_CONTENT_BYTES: usize = 1024;

/// Signals feeding the write-time relevance score.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceSignals {
    /// The originating feedback carried negative sentiment.
    pub negative_sentiment: bool,
    /// The content payload exceeds the substantial-size threshold.
    pub substantial_content: bool,
    /// Execution finished faster than the worker's rolling average.
    pub faster_than_average: bool,
}

impl RelevanceSignals {
    /// Computes the relevance score, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn score(&self) -> f64 {
        let mut relevance = BASE_RELEVANCE;
        if self.negative_sentiment {
            relevance += NEGATIVE_SENTIMENT_BOOST;
        }
        if self.substantial_content {
            relevance += SUBSTANTIAL_CONTENT_BOOST;
        }
        if self.faster_than_average {
            relevance += FAST_EXECUTION_BOOST;
        }
        relevance.clamp(0.0, 1.0)
    }

    /// Marks the content-size signal from a serialized payload.
    #[must_use]
    pub fn with_content(mut self, content: &serde_json::Value) -> Self {
        self.substantial_content = content.to_string().len() > SUBSTANTIAL_CONTENT_BYTES;
        self
    }

    /// Marks the execution-speed signal against a rolling average.
    ///
    /// An average of zero means the worker has no history yet; the boost
    /// does not apply.
    #[must_use]
    pub fn with_duration(mut self, duration_ms: u64, average_ms: f64) -> Self {
        let elapsed = u32::try_from(duration_ms).unwrap_or(u32::MAX);
        self.faster_than_average = average_ms > 0.0 && f64::from(elapsed) < average_ms;
        self
    }

    /// Marks the sentiment signal.
    #[must_use]
    pub const fn with_sentiment(mut self, sentiment: crate::models::Sentiment) -> Self {
        self.negative_sentiment = matches!(sentiment, crate::models::Sentiment::Negative);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sentiment;
    use test_case::test_case;

    #[test]
    fn test_base_score() {
        let score = RelevanceSignals::default().score();
        assert!((score - 0.7).abs() < f64::EPSILON);
    }

    #[test_case(true, false, false, 0.9)]
    #[test_case(false, true, false, 0.8)]
    #[test_case(false, false, true, 0.9)]
    #[test_case(true, true, false, 1.0)]
    fn test_individual_boosts(negative: bool, substantial: bool, fast: bool, expected: f64) {
        let signals = RelevanceSignals {
            negative_sentiment: negative,
            substantial_content: substantial,
            faster_than_average: fast,
        };
        assert!((signals.score() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped_at_one() {
        let signals = RelevanceSignals {
            negative_sentiment: true,
            substantial_content: true,
            faster_than_average: true,
        };
        assert!((signals.score() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_with_content_threshold() {
        let small = serde_json::json!({"note": "short"});
        assert!(!RelevanceSignals::default().with_content(&small).substantial_content);

        let big = serde_json::json!({"note": "x".repeat(2000)});
        assert!(RelevanceSignals::default().with_content(&big).substantial_content);
    }

    #[test]
    fn test_with_duration_requires_history() {
        // No history: average is zero, no boost even for a fast run.
        assert!(!RelevanceSignals::default().with_duration(10, 0.0).faster_than_average);
        assert!(RelevanceSignals::default().with_duration(100, 500.0).faster_than_average);
        assert!(!RelevanceSignals::default().with_duration(900, 500.0).faster_than_average);
    }

    #[test]
    fn test_with_sentiment() {
        assert!(
            RelevanceSignals::default()
                .with_sentiment(Sentiment::Negative)
                .negative_sentiment
        );
        assert!(
            !RelevanceSignals::default()
                .with_sentiment(Sentiment::Positive)
                .negative_sentiment
        );
    }
}
