//! Feedback processing.
//!
//! Converts one raw feedback item into structured insights via a reasoning
//! call. The deterministic fallback (rating thresholds) applies on any
//! provider failure or malformed response, so processing never fails.

use crate::llm::{LlmProvider, parse_json_response};
use crate::models::{FeedbackItem, ProcessedFeedback};
use std::sync::Arc;
use tracing::warn;

/// System prompt for feedback analysis.
const FEEDBACK_SYSTEM_PROMPT: &str = "\
You analyze user feedback for an AI worker and extract actionable \
insights. Respond with JSON only:
{
  \"sentiment\": \"positive|negative|neutral\",
  \"improvement_areas\": [\"...\"],
  \"recommendations\": [\"...\"],
  \"priority\": \"high|medium|low\",
  \"categories\": [\"quality|performance|usability|content\"],
  \"confidence\": 0.8
}";

/// Converts raw feedback into structured insights.
pub struct FeedbackProcessor {
    llm: Arc<dyn LlmProvider>,
}

impl FeedbackProcessor {
    /// Creates a processor over a reasoning provider.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Processes one feedback item.
    ///
    /// Never fails: any reasoning-call problem degrades to
    /// [`ProcessedFeedback::fallback_from_rating`].
    #[must_use]
    pub fn process(&self, item: &FeedbackItem) -> ProcessedFeedback {
        let user = format!(
            "Worker: {}\nRating: {}/5\nComments: {}",
            item.worker_name,
            item.rating,
            item.comment.as_deref().unwrap_or("(none)")
        );

        match self
            .llm
            .complete_with_system(FEEDBACK_SYSTEM_PROMPT, &user)
            .and_then(|response| {
                parse_json_response::<ProcessedFeedback>(&response, "process_feedback")
            }) {
            Ok(insights) => insights,
            Err(e) => {
                warn!(
                    feedback_id = %item.id,
                    worker = %item.worker_name,
                    error = %e,
                    "Feedback analysis degraded to fallback"
                );
                metrics::counter!("learning_feedback_fallbacks_total").increment(1);
                ProcessedFeedback::fallback_from_rating(item.rating)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, Sentiment};
    use crate::{Error, Result};

    struct StaticProvider {
        response: Option<String>,
    }

    impl LlmProvider for StaticProvider {
        fn name(&self) -> &'static str {
            "static"
        }

        fn complete(&self, _prompt: &str) -> Result<String> {
            self.response.clone().ok_or_else(|| Error::OperationFailed {
                operation: "static".to_string(),
                cause: "unreachable provider".to_string(),
            })
        }
    }

    fn item(rating: u8) -> FeedbackItem {
        FeedbackItem {
            id: "fb1".to_string(),
            request_id: "req_1".to_string(),
            worker_name: "content".to_string(),
            rating,
            comment: Some("intro was too long".to_string()),
            processed: false,
            created_at: 0,
        }
    }

    #[test]
    fn test_unreachable_provider_falls_back_by_rating() {
        let processor = FeedbackProcessor::new(Arc::new(StaticProvider { response: None }));

        let insights = processor.process(&item(1));
        assert_eq!(insights.sentiment, Sentiment::Negative);
        assert_eq!(insights.priority, Priority::High);
    }

    #[test]
    fn test_malformed_response_falls_back() {
        let processor = FeedbackProcessor::new(Arc::new(StaticProvider {
            response: Some("I think the user is unhappy.".to_string()),
        }));

        let insights = processor.process(&item(5));
        assert_eq!(insights.sentiment, Sentiment::Positive);
        assert_eq!(insights.priority, Priority::Low);
    }

    #[test]
    fn test_valid_response_is_used() {
        let processor = FeedbackProcessor::new(Arc::new(StaticProvider {
            response: Some(
                r#"{
                    "sentiment": "negative",
                    "improvement_areas": ["pacing"],
                    "recommendations": ["tighten the intro"],
                    "priority": "medium",
                    "categories": ["content"],
                    "confidence": 0.9
                }"#
                .to_string(),
            ),
        }));

        let insights = processor.process(&item(3));
        assert_eq!(insights.sentiment, Sentiment::Negative);
        assert_eq!(insights.priority, Priority::Medium);
        assert_eq!(insights.improvement_areas, vec!["pacing".to_string()]);
        assert!((insights.confidence - 0.9).abs() < f64::EPSILON);
    }
}
