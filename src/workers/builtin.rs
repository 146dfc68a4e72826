//! Built-in LLM-backed workers.
//!
//! One generic [`LlmWorker`] type covers every built-in role: the role
//! supplies the name, capability tags, and system prompt; execution builds
//! a prompt from the subtask context (including memory hits and prior
//! results) and returns the completion as the outcome payload.

use super::{Worker, WorkerContext, WorkerOutcome, WorkerRegistry};
use crate::Result;
use crate::llm::LlmProvider;
use std::fmt::Write as _;
use std::sync::Arc;

/// A worker whose execution is a single reasoning call.
pub struct LlmWorker {
    name: String,
    description: String,
    capabilities: Vec<String>,
    system_prompt: String,
    llm: Arc<dyn LlmProvider>,
}

impl LlmWorker {
    /// Creates a worker with an explicit role definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        capabilities: Vec<String>,
        system_prompt: impl Into<String>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: capabilities.into_iter().collect(),
            system_prompt: system_prompt.into(),
            llm,
        }
    }

    /// The research role: gathering and summarizing information.
    #[must_use]
    pub fn research(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(
            "research",
            "Web research, data gathering, market analysis",
            vec![
                "web_research".to_string(),
                "data_gathering".to_string(),
                "general".to_string(),
            ],
            "You are a research specialist. Gather the relevant facts for the \
             request, cite what you rely on, and summarize findings as concise \
             bullet points.",
            llm,
        )
    }

    /// The analysis role: interpreting data and extracting insights.
    #[must_use]
    pub fn analysis(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(
            "analysis",
            "Data processing, statistical analysis, insights generation",
            vec![
                "data_analysis".to_string(),
                "insights".to_string(),
                "general".to_string(),
            ],
            "You are a data analyst. Work through the provided material \
             step by step and report the key insights with the reasoning \
             behind each one.",
            llm,
        )
    }

    /// The content role: producing written deliverables.
    #[must_use]
    pub fn content(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(
            "content",
            "Blog writing, article creation, copywriting",
            vec![
                "writing".to_string(),
                "copywriting".to_string(),
                "general".to_string(),
            ],
            "You are a content writer. Produce the requested text in a clear, \
             engaging voice, matching any tone or format constraints in the \
             request.",
            llm,
        )
    }

    /// The recommendation role: strategic advice and decision support.
    #[must_use]
    pub fn recommendation(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(
            "recommendation",
            "Strategic advice, decision support, planning",
            vec![
                "strategy".to_string(),
                "planning".to_string(),
                "general".to_string(),
            ],
            "You are a strategic advisor. Weigh the options implied by the \
             request and give a ranked recommendation with trade-offs.",
            llm,
        )
    }

    /// The general fallback role.
    #[must_use]
    pub fn general(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(
            "general",
            "General-purpose assistant for unclassified requests",
            vec!["general".to_string()],
            "You are a capable generalist. Complete the request directly and \
             state any assumptions you had to make.",
            llm,
        )
    }

    /// Builds the user prompt from the execution context.
    fn build_prompt(context: &WorkerContext) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Task: {}", context.query);
        let _ = writeln!(prompt, "Priority: {}", context.priority);

        if !context.memory_hits.is_empty() {
            let _ = writeln!(prompt, "\nLessons from past executions:");
            for hit in &context.memory_hits {
                let _ = writeln!(prompt, "- [{}] {}", hit.kind, hit.content);
            }
        }

        if !context.prior_results.is_empty() {
            let _ = writeln!(prompt, "\nResults from earlier subtasks:");
            for (id, data) in &context.prior_results {
                let _ = writeln!(prompt, "- {id}: {data}");
            }
        }

        prompt
    }
}

impl Worker for LlmWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    fn execute(&self, context: &WorkerContext) -> Result<WorkerOutcome> {
        let prompt = Self::build_prompt(context);
        let output = self.llm.complete_with_system(&self.system_prompt, &prompt)?;

        Ok(WorkerOutcome::new(
            serde_json::json!({ "output": output }),
            format!("{} completed", self.name),
        ))
    }
}

/// Registers the fixed built-in worker set.
///
/// The registry is built once at startup from this list; there is no
/// reflection-based discovery.
pub fn register_builtin_workers(registry: &WorkerRegistry, llm: &Arc<dyn LlmProvider>) {
    registry.register(Arc::new(LlmWorker::research(Arc::clone(llm))));
    registry.register(Arc::new(LlmWorker::analysis(Arc::clone(llm))));
    registry.register(Arc::new(LlmWorker::content(Arc::clone(llm))));
    registry.register(Arc::new(LlmWorker::recommendation(Arc::clone(llm))));
    registry.register(Arc::new(LlmWorker::general(Arc::clone(llm))));
}
