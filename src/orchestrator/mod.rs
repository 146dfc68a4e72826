//! Request orchestration.
//!
//! One request flows through four steps: analyze the intent, decompose
//! into an ordered subtask plan, execute each subtask against the worker
//! registry (priming workers with relevant memory), and compile the
//! results. Partial failure is an outcome, not an error: a request always
//! yields a [`CompiledResult`] unless the plan itself is unrepairable.

mod plan;

pub use plan::{analyze, decompose};

use crate::config::ForemanConfig;
use crate::llm::LlmProvider;
use crate::memory::{MemoryStore, RelevanceSignals};
use crate::models::{
    CompiledResult, FailureReason, MemoryKind, MemoryQuery, Subtask, SubtaskReport, SubtaskStatus,
    WorkRequest,
};
use crate::storage::TaskBackend;
use crate::workers::{WorkerContext, WorkerRegistry};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Coordinates request handling across the registry and the memory store.
pub struct Orchestrator {
    registry: Arc<WorkerRegistry>,
    memory: MemoryStore,
    tasks: Arc<dyn TaskBackend>,
    llm: Arc<dyn LlmProvider>,
    config: ForemanConfig,
}

impl Orchestrator {
    /// Creates an orchestrator over its collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<WorkerRegistry>,
        memory: MemoryStore,
        tasks: Arc<dyn TaskBackend>,
        llm: Arc<dyn LlmProvider>,
        config: ForemanConfig,
    ) -> Self {
        Self {
            registry,
            memory,
            tasks,
            llm,
            config,
        }
    }

    /// Handles one request end to end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty query and
    /// [`Error::PlanInvariant`] when decomposition produces an
    /// unrepairable plan. Every other failure stays local to a subtask
    /// and is reported inside the [`CompiledResult`].
    #[instrument(name = "foreman.orchestrator.handle", skip(self, request), fields(request_id = %request.id))]
    pub fn handle(&self, request: &WorkRequest) -> Result<CompiledResult> {
        if request.query.trim().is_empty() {
            return Err(Error::InvalidInput("request query cannot be empty".to_string()));
        }

        let start = Instant::now();

        if let Err(e) = self.tasks.record_request(request) {
            warn!(request_id = %request.id, error = %e, "Failed to persist request");
        }

        // Step 1: analyze (degrades to fallback, never fatal).
        let classification = plan::analyze(self.llm.as_ref(), request);

        // Step 2: decompose (degrades to a single-subtask fallback; a
        // dependency cycle is the sole fatal outcome).
        let mut subtasks = plan::decompose(self.llm.as_ref(), request, &classification)?;

        // Subtasks are persisted before execution begins.
        if let Err(e) = self.tasks.record_subtasks(&request.id, &subtasks) {
            warn!(request_id = %request.id, error = %e, "Failed to persist subtask plan");
        }

        // Step 3: execute in ascending order.
        self.execute_subtasks(request, &mut subtasks);

        // Step 4: compile.
        let result = self.compile(request, &subtasks, start);

        metrics::counter!("orchestrator_requests_total").increment(1);
        metrics::histogram!("orchestrator_request_duration_ms")
            .record(elapsed_ms_f64(result.elapsed_ms));
        info!(
            request_id = %request.id,
            completed = result.completed,
            failed = result.failed,
            partial_failure = result.partial_failure,
            "Request handled"
        );

        Ok(result)
    }

    /// Executes the plan sequentially, enforcing declared dependencies.
    fn execute_subtasks(&self, request: &WorkRequest, subtasks: &mut [Subtask]) {
        let mut completed_results = serde_json::Map::new();

        for index in 0..subtasks.len() {
            let subtask_id = subtasks[index].id.clone();

            // Dependency gate: every declared dependency must have reached
            // Completed. Unknown ids can never complete and fail here too.
            let unmet = subtasks[index]
                .depends_on
                .iter()
                .find(|dep| {
                    !subtasks
                        .iter()
                        .any(|s| s.id == **dep && s.status == SubtaskStatus::Completed)
                })
                .cloned();
            if let Some(dep) = unmet {
                let now = crate::current_timestamp();
                subtasks[index].mark_failed(
                    FailureReason::DependencyFailed,
                    format!("dependency {dep} did not complete"),
                    now,
                );
                self.persist_subtask(&request.id, &subtasks[index]);
                continue;
            }

            // Registry gate: a missing worker fails this subtask only.
            let worker = match self.registry.lookup(&subtasks[index].worker_name) {
                Ok(worker) => worker,
                Err(e) => {
                    warn!(
                        request_id = %request.id,
                        subtask = %subtask_id,
                        worker = %subtasks[index].worker_name,
                        "Worker unavailable, skipping subtask"
                    );
                    let now = crate::current_timestamp();
                    subtasks[index].mark_failed(
                        FailureReason::WorkerUnavailable,
                        e.to_string(),
                        now,
                    );
                    self.persist_subtask(&request.id, &subtasks[index]);
                    continue;
                },
            };

            // Prime the worker with its most relevant memories.
            let hits = self.memory.retrieve(
                &MemoryQuery::for_worker(subtasks[index].worker_name.as_str())
                    .with_tags(vec![subtasks[index].worker_name.clone()])
                    .with_limit(self.config.memory.retrieval_limit)
                    .with_min_relevance(self.config.memory.min_relevance),
            );

            let context = WorkerContext::new(request.id.clone(), subtasks[index].description.clone())
                .with_priority(request.priority)
                .with_prior_results(completed_results.clone())
                .with_memory_hits(hits);

            subtasks[index].mark_running(crate::current_timestamp());
            self.persist_subtask(&request.id, &subtasks[index]);

            // Rolling average before this execution, for the speed signal.
            let average_ms = self
                .tasks
                .worker_stats(&subtasks[index].worker_name)
                .ok()
                .flatten()
                .map_or(0.0, |stats| stats.average_duration_ms());

            let exec_start = Instant::now();
            let outcome = worker.execute(&context);
            let duration_ms = u64::try_from(exec_start.elapsed().as_millis()).unwrap_or(u64::MAX);
            let now = crate::current_timestamp();

            match outcome {
                Ok(outcome) => {
                    completed_results.insert(subtask_id.clone(), outcome.data.clone());
                    subtasks[index].mark_completed(outcome.data, now);
                    self.record_outcome(&subtasks[index], request, true, duration_ms, average_ms);
                },
                Err(e) => {
                    warn!(
                        request_id = %request.id,
                        subtask = %subtask_id,
                        error = %e,
                        "Subtask execution failed"
                    );
                    subtasks[index].mark_failed(FailureReason::ExecutionError, e.to_string(), now);
                    self.record_outcome(&subtasks[index], request, false, duration_ms, average_ms);
                },
            }
            self.persist_subtask(&request.id, &subtasks[index]);
        }
    }

    /// Persists a subtask state change, logging failures.
    fn persist_subtask(&self, request_id: &str, subtask: &Subtask) {
        if let Err(e) = self.tasks.update_subtask(request_id, subtask) {
            warn!(request_id, subtask = %subtask.id, error = %e, "Failed to persist subtask update");
        }
    }

    /// Folds an execution into worker stats and writes the outcome memory.
    ///
    /// Both writes are best-effort: memory failures must never fail the
    /// request path.
    fn record_outcome(
        &self,
        subtask: &Subtask,
        request: &WorkRequest,
        success: bool,
        duration_ms: u64,
        average_ms: f64,
    ) {
        if let Err(e) = self.tasks.record_execution(
            &subtask.worker_name,
            success,
            duration_ms,
            crate::current_timestamp(),
        ) {
            warn!(worker = %subtask.worker_name, error = %e, "Failed to record worker stats");
        }

        let (kind, content) = if success {
            (
                MemoryKind::Success,
                serde_json::json!({
                    "request_id": request.id,
                    "subtask_id": subtask.id,
                    "description": subtask.description,
                    "duration_ms": duration_ms,
                    "result": subtask.result,
                }),
            )
        } else {
            (
                MemoryKind::Error,
                serde_json::json!({
                    "request_id": request.id,
                    "subtask_id": subtask.id,
                    "description": subtask.description,
                    "duration_ms": duration_ms,
                    "error": subtask.error,
                }),
            )
        };

        let relevance = RelevanceSignals::default()
            .with_content(&content)
            .with_duration(duration_ms, average_ms)
            .score();

        self.memory.store_best_effort(
            &subtask.worker_name,
            kind,
            content,
            vec![subtask.worker_name.clone(), "execution".to_string()],
            relevance,
        );
    }

    /// Merges subtask outcomes into the final result.
    fn compile(&self, request: &WorkRequest, subtasks: &[Subtask], start: Instant) -> CompiledResult {
        let completed = subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Completed)
            .count();
        let failed = subtasks.len() - completed;

        let reports: Vec<SubtaskReport> = subtasks
            .iter()
            .map(|s| SubtaskReport {
                subtask_id: s.id.clone(),
                worker_name: s.worker_name.clone(),
                status: s.status.as_str().to_string(),
                data: s.result.clone(),
                error: s.error.clone(),
            })
            .collect();

        let summary = self.summarize(request, subtasks, completed, failed);

        CompiledResult {
            request_id: request.id.clone(),
            summary,
            completed,
            failed,
            total: subtasks.len(),
            partial_failure: failed > 0,
            reports,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Builds the human-readable summary, with a deterministic fallback.
    fn summarize(
        &self,
        request: &WorkRequest,
        subtasks: &[Subtask],
        completed: usize,
        failed: usize,
    ) -> String {
        let fallback = format!(
            "Task execution completed with {completed} successful subtasks and {failed} failed subtasks."
        );
        if completed == 0 {
            return fallback;
        }

        let results: Vec<String> = subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Completed)
            .map(|s| {
                format!(
                    "{} ({}): {}",
                    s.id,
                    s.worker_name,
                    s.result.as_ref().map_or_else(String::new, |r| r.to_string())
                )
            })
            .collect();
        let user = format!(
            "Original query: {}\n\nSubtask results:\n{}\n\nSummarize what was accomplished, concisely.",
            request.query,
            results.join("\n")
        );

        self.llm
            .complete_with_system(
                "You are a results compiler. Summarize the execution results \
                 for the user: key findings, produced content, and anything \
                 that failed. Be concise but complete.",
                &user,
            )
            .unwrap_or(fallback)
    }
}

fn elapsed_ms_f64(elapsed_ms: u64) -> f64 {
    let capped = u32::try_from(elapsed_ms).unwrap_or(u32::MAX);
    f64::from(capped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use crate::storage::SqliteStore;
    use crate::workers::{Worker, WorkerOutcome};

    /// Provider that fails every call, forcing all fallbacks.
    struct DownProvider;

    impl LlmProvider for DownProvider {
        fn name(&self) -> &'static str {
            "down"
        }

        fn complete(&self, _prompt: &str) -> Result<String> {
            Err(Error::OperationFailed {
                operation: "down".to_string(),
                cause: "unreachable".to_string(),
            })
        }
    }

    /// Provider that returns a fixed decomposition plan.
    struct PlanProvider {
        plan: String,
    }

    impl LlmProvider for PlanProvider {
        fn name(&self) -> &'static str {
            "plan"
        }

        fn complete(&self, prompt: &str) -> Result<String> {
            if prompt.contains("Break this down") {
                Ok(self.plan.clone())
            } else {
                Err(Error::OperationFailed {
                    operation: "plan".to_string(),
                    cause: "only decomposition is scripted".to_string(),
                })
            }
        }
    }

    struct StubWorker {
        name: String,
        fail: bool,
    }

    impl StubWorker {
        fn ok(name: &str) -> Arc<dyn Worker> {
            Arc::new(Self {
                name: name.to_string(),
                fail: false,
            })
        }

        fn failing(name: &str) -> Arc<dyn Worker> {
            Arc::new(Self {
                name: name.to_string(),
                fail: true,
            })
        }
    }

    impl Worker for StubWorker {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> &[String] {
            &[]
        }

        fn execute(&self, context: &WorkerContext) -> Result<WorkerOutcome> {
            if self.fail {
                Err(Error::OperationFailed {
                    operation: "stub_execute".to_string(),
                    cause: "worker crashed".to_string(),
                })
            } else {
                Ok(WorkerOutcome::new(
                    serde_json::json!({
                        "echo": context.query,
                        "memories": context.memory_hits.len(),
                        "prior": context.prior_results.len(),
                    }),
                    "done",
                ))
            }
        }
    }

    fn orchestrator(llm: Arc<dyn LlmProvider>) -> (Orchestrator, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().expect("store"));
        let registry = Arc::new(WorkerRegistry::new());
        let orchestrator = Orchestrator::new(
            registry,
            MemoryStore::new(Arc::<SqliteStore>::clone(&store)),
            Arc::<SqliteStore>::clone(&store),
            llm,
            ForemanConfig::default(),
        );
        (orchestrator, store)
    }

    fn two_step_plan() -> String {
        r#"[
            {"worker_name": "research", "description": "find data", "order": 1},
            {"worker_name": "content", "description": "write post", "depends_on": ["subtask_1"], "order": 2}
        ]"#
        .to_string()
    }

    #[test]
    fn test_empty_query_rejected() {
        let (orchestrator, _) = orchestrator(Arc::new(DownProvider));
        let request = WorkRequest::new("   ");
        assert!(matches!(
            orchestrator.handle(&request),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_everything_down_still_compiles_result() {
        // LLM down, registry empty: fallback plan targets "general",
        // worker is unavailable, and the request still returns a result.
        let (orchestrator, _) = orchestrator(Arc::new(DownProvider));
        let request = WorkRequest::new("do the thing");

        let result = orchestrator.handle(&request).expect("result");
        assert_eq!(result.total, 1);
        assert_eq!(result.completed, 0);
        assert_eq!(result.failed, 1);
        assert!(result.partial_failure);
        assert_eq!(result.reports[0].status, "failed");
    }

    #[test]
    fn test_missing_worker_fails_only_its_subtask() {
        let (orchestrator, _) = orchestrator(Arc::new(PlanProvider {
            plan: two_step_plan(),
        }));
        orchestrator.registry.register(StubWorker::ok("research"));
        // "content" is not registered.

        let request = WorkRequest::new("research and write");
        let result = orchestrator.handle(&request).expect("result");

        assert_eq!(result.completed, 1);
        assert_eq!(result.failed, 1);
        assert!(result.partial_failure);
        assert_eq!(result.reports[0].status, "completed");
        assert_eq!(result.reports[1].status, "failed");
        assert!(
            result.reports[1]
                .error
                .as_deref()
                .is_some_and(|e| e.contains("worker not found"))
        );
    }

    #[test]
    fn test_dependency_failure_cascades() {
        let (orchestrator, _) = orchestrator(Arc::new(PlanProvider {
            plan: two_step_plan(),
        }));
        orchestrator.registry.register(StubWorker::failing("research"));
        orchestrator.registry.register(StubWorker::ok("content"));

        let request = WorkRequest::new("research and write");
        let result = orchestrator.handle(&request).expect("result");

        assert_eq!(result.completed, 0);
        assert_eq!(result.failed, 2);
        // The dependent subtask never executed.
        assert!(
            result.reports[1]
                .error
                .as_deref()
                .is_some_and(|e| e.contains("did not complete"))
        );
    }

    #[test]
    fn test_completed_dependency_feeds_prior_results() {
        let (orchestrator, _) = orchestrator(Arc::new(PlanProvider {
            plan: two_step_plan(),
        }));
        orchestrator.registry.register(StubWorker::ok("research"));
        orchestrator.registry.register(StubWorker::ok("content"));

        let request = WorkRequest::new("research and write").with_priority(Priority::High);
        let result = orchestrator.handle(&request).expect("result");

        assert_eq!(result.completed, 2);
        assert!(!result.partial_failure);
        let content_data = result.reports[1].data.as_ref().expect("data");
        assert_eq!(content_data["prior"], 1);
    }

    #[test]
    fn test_outcome_memories_written() {
        use crate::storage::MemoryBackend;

        let (orchestrator, store) = orchestrator(Arc::new(PlanProvider {
            plan: two_step_plan(),
        }));
        orchestrator.registry.register(StubWorker::ok("research"));
        orchestrator.registry.register(StubWorker::failing("content"));

        let request = WorkRequest::new("research and write");
        orchestrator.handle(&request).expect("result");

        let success = store
            .query(&MemoryQuery::for_worker("research").with_kind(MemoryKind::Success))
            .expect("query");
        assert_eq!(success.len(), 1);
        assert_eq!(success[0].content["request_id"], request.id);

        let errors = store
            .query(&MemoryQuery::for_worker("content").with_kind(MemoryKind::Error))
            .expect("query");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_worker_stats_updated() {
        let (orchestrator, store) = orchestrator(Arc::new(PlanProvider {
            plan: two_step_plan(),
        }));
        orchestrator.registry.register(StubWorker::ok("research"));
        orchestrator.registry.register(StubWorker::ok("content"));

        orchestrator
            .handle(&WorkRequest::new("go"))
            .expect("result");

        let stats = store
            .worker_stats("research")
            .expect("stats")
            .expect("present");
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.successful_executions, 1);
    }

    #[test]
    fn test_fallback_summary_reports_counts() {
        let (orchestrator, _) = orchestrator(Arc::new(DownProvider));
        let request = WorkRequest::new("do the thing");
        let result = orchestrator.handle(&request).expect("result");
        assert!(result.summary.contains("0 successful"));
        assert!(result.summary.contains("1 failed"));
    }
}
