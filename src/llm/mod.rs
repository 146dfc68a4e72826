//! LLM client abstraction.
//!
//! Provides a unified interface for the reasoning calls the orchestrator
//! and learning loop make. Every call site has a deterministic fallback:
//! a provider failure or malformed JSON response degrades the caller, it
//! never aborts a request or a learning cycle.

mod ollama;
mod openai;
mod resilience;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use resilience::{ResilienceConfig, ResilientProvider};

use crate::config::{LlmConfig, LlmProviderKind};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Trait for LLM providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Generates a completion with a system prompt.
    ///
    /// Default implementation concatenates system and user prompts.
    /// Providers should override this to use native system prompt support.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        let combined = format!("{system}\n\n---\n\nUser message:\n{user}");
        self.complete(&combined)
    }
}

/// HTTP client configuration for LLM providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(timeout_ms) = config.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        settings
    }
}

/// Builds a blocking HTTP client for LLM requests with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build LLM HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Builds the configured provider, wrapped in the circuit breaker.
#[must_use]
pub fn build_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    let http = LlmHttpConfig::from_config(config);
    let resilience = ResilienceConfig::from_config(config);

    match config.provider {
        LlmProviderKind::Ollama => {
            let mut client = OllamaClient::new().with_http_config(http);
            if let Some(ref model) = config.model {
                client = client.with_model(model.clone());
            }
            if let Some(ref base_url) = config.base_url {
                client = client.with_endpoint(base_url.clone());
            }
            client = client
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens);
            Arc::new(ResilientProvider::new(client, resilience))
        },
        LlmProviderKind::OpenAi => {
            let mut client = OpenAiClient::new().with_http_config(http);
            if let Some(ref model) = config.model {
                client = client.with_model(model.clone());
            }
            if let Some(ref api_key) = config.api_key {
                client = client.with_api_key(api_key.clone());
            }
            if let Some(ref base_url) = config.base_url {
                client = client.with_endpoint(base_url.clone());
            }
            client = client
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens);
            Arc::new(ResilientProvider::new(client, resilience))
        },
    }
}

/// Parses a typed value out of an LLM response.
///
/// Handles markdown code fences and prose-wrapped JSON. A parse failure is
/// an `OperationFailed` the caller converts into its deterministic
/// fallback.
///
/// # Errors
///
/// Returns an error if no valid JSON for `T` can be extracted.
pub fn parse_json_response<T: DeserializeOwned>(response: &str, operation: &str) -> Result<T> {
    let json_str = extract_json_from_response(response);
    serde_json::from_str(json_str).map_err(|e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("invalid JSON: {e}. Response: {response}"),
    })
}

/// Extracts JSON from an LLM response, handling markdown code blocks.
fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // ``` ... ``` blocks without a language marker
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find(['{', '['])
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Raw JSON object embedded in prose
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if start < end {
                return &trimmed[start..=end];
            }
        }
    }

    // JSON array (decomposition plans)
    if let Some(start) = trimmed.find('[') {
        if let Some(end) = trimmed.rfind(']') {
            if start < end {
                return &trimmed[start..=end];
            }
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Classification;

    #[test]
    fn test_extract_json_raw() {
        assert_eq!(
            extract_json_from_response(r#"{"key": "value"}"#),
            r#"{"key": "value"}"#
        );
    }

    #[test]
    fn test_extract_json_markdown() {
        let response = "```json\n{\"key\": \"value\"}\n```";
        assert!(extract_json_from_response(response).contains("\"key\""));
    }

    #[test]
    fn test_extract_json_with_prose() {
        let response = "Here is the result: {\"key\": \"value\"} hope this helps";
        assert_eq!(extract_json_from_response(response), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_array() {
        let response = "```\n[{\"worker_name\": \"research\"}]\n```";
        assert_eq!(
            extract_json_from_response(response),
            r#"[{"worker_name": "research"}]"#
        );
    }

    #[test]
    fn test_parse_classification() {
        let response = r#"{
            "kind": "research",
            "capabilities": ["web_search"],
            "complexity": "moderate",
            "subtask_kinds": ["research", "analysis"]
        }"#;

        let classification: Classification =
            parse_json_response(response, "analyze").expect("parse");
        assert_eq!(classification.kind, "research");
        assert_eq!(classification.subtask_kinds.len(), 2);
    }

    #[test]
    fn test_parse_rejects_prose_only() {
        let result: Result<Classification> =
            parse_json_response("I could not classify that.", "analyze");
        assert!(result.is_err());
    }
}
