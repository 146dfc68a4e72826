//! End-to-end orchestration tests over the public API.

use foreman::config::ForemanConfig;
use foreman::memory::MemoryStore;
use foreman::models::{MemoryKind, MemoryQuery, Priority, WorkRequest};
use foreman::orchestrator::Orchestrator;
use foreman::storage::{MemoryBackend, SqliteStore};
use foreman::workers::{Worker, WorkerContext, WorkerOutcome, WorkerRegistry};
use foreman::{Error, LlmProvider, Result};
use std::sync::{Arc, Mutex};

/// Provider scripted to return a fixed decomposition plan and fail
/// everything else.
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

/// Worker that records the order in which executions happen.
struct RecordingWorker {
    worker_name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Worker for RecordingWorker {
    fn name(&self) -> &str {
        &self.worker_name
    }

    fn capabilities(&self) -> &[String] {
        &[]
    }

    fn execute(&self, context: &WorkerContext) -> Result<WorkerOutcome> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(self.worker_name.clone());
        Ok(WorkerOutcome::new(
            serde_json::json!({"echo": context.query}),
            "done",
        ))
    }
}

fn orchestrator_with(
    plan: &str,
    workers: &[(&str, Arc<Mutex<Vec<String>>>)],
) -> (Orchestrator, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().expect("store"));
    let registry = Arc::new(WorkerRegistry::new());
    for (name, log) in workers {
        registry.register(Arc::new(RecordingWorker {
            worker_name: (*name).to_string(),
            log: Arc::clone(log),
        }));
    }

    let orchestrator = Orchestrator::new(
        registry,
        MemoryStore::new(Arc::<SqliteStore>::clone(&store)),
        Arc::<SqliteStore>::clone(&store),
        Arc::new(PlanProvider {
            plan: plan.to_string(),
        }),
        ForemanConfig::default(),
    );
    (orchestrator, store)
}

const RESEARCH_THEN_CONTENT: &str = r#"[
    {"worker_name": "research", "description": "gather market data", "order": 1},
    {"worker_name": "content", "description": "write the post", "depends_on": ["subtask_1"], "order": 2}
]"#;

#[test]
fn missing_worker_yields_partial_failure_not_abort() {
    // Subtask 1 (research) completes, subtask 2 (content)
    // has no registered worker; the request still compiles.
    let log = Arc::new(Mutex::new(Vec::new()));
    let (orchestrator, _store) =
        orchestrator_with(RESEARCH_THEN_CONTENT, &[("research", Arc::clone(&log))]);

    let result = orchestrator
        .handle(&WorkRequest::new("market post"))
        .expect("compiled result");

    assert_eq!(result.completed, 1);
    assert_eq!(result.failed, 1);
    assert!(result.partial_failure);
    assert_eq!(result.reports[0].status, "completed");
    assert_eq!(result.reports[1].status, "failed");
    assert!(
        result.reports[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("worker not found: content"))
    );
}

#[test]
fn dependencies_execute_before_dependents() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (orchestrator, _store) = orchestrator_with(
        RESEARCH_THEN_CONTENT,
        &[("research", Arc::clone(&log)), ("content", Arc::clone(&log))],
    );

    let result = orchestrator
        .handle(&WorkRequest::new("market post"))
        .expect("compiled result");

    assert_eq!(result.completed, 2);
    assert!(!result.partial_failure);
    let executed = log
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    assert_eq!(executed, vec!["research".to_string(), "content".to_string()]);
}

#[test]
fn dependency_order_enforced_even_when_declared_backwards() {
    // The plan declares the dependent with the lower order; normalization
    // must still run the dependency first.
    let plan = r#"[
        {"worker_name": "content", "description": "write", "depends_on": ["subtask_2"], "order": 1},
        {"worker_name": "research", "description": "gather", "order": 2}
    ]"#;
    let log = Arc::new(Mutex::new(Vec::new()));
    let (orchestrator, _store) = orchestrator_with(
        plan,
        &[("research", Arc::clone(&log)), ("content", Arc::clone(&log))],
    );

    let result = orchestrator
        .handle(&WorkRequest::new("post"))
        .expect("compiled result");

    assert_eq!(result.completed, 2);
    let executed = log
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    assert_eq!(executed, vec!["research".to_string(), "content".to_string()]);
}

#[test]
fn empty_registry_returns_zero_completed_result() {
    let (orchestrator, _store) = orchestrator_with(RESEARCH_THEN_CONTENT, &[]);

    let result = orchestrator
        .handle(&WorkRequest::new("anything"))
        .expect("compiled result");

    assert_eq!(result.completed, 0);
    assert_eq!(result.failed, result.total);
    assert!(result.partial_failure);
}

#[test]
fn outcome_memories_retrievable_by_worker_and_tag() {
    // A stored record is retrievable with its worker and
    // tag filter above the relevance floor.
    let log = Arc::new(Mutex::new(Vec::new()));
    let (orchestrator, store) =
        orchestrator_with(RESEARCH_THEN_CONTENT, &[("research", log)]);

    orchestrator
        .handle(&WorkRequest::new("market post").with_priority(Priority::High))
        .expect("compiled result");

    let records = store
        .query(
            &MemoryQuery::for_worker("research")
                .with_kind(MemoryKind::Success)
                .with_tag("execution")
                .with_min_relevance(0.5),
        )
        .expect("query");
    assert_eq!(records.len(), 1);
    assert!(records[0].relevance >= 0.5);
}

#[test]
fn memory_store_roundtrip_scenario() {
    let store = Arc::new(SqliteStore::in_memory().expect("store"));
    let memory = MemoryStore::new(Arc::<SqliteStore>::clone(&store));

    let id = memory
        .store(
            "w",
            MemoryKind::Success,
            serde_json::json!({"note": "fast run"}),
            vec!["x".to_string()],
            0.9,
        )
        .expect("store");

    let hits = memory.retrieve(
        &MemoryQuery::for_worker("w")
            .with_tags(vec!["x".to_string()])
            .with_min_relevance(0.5),
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, id);
}

#[test]
fn second_request_is_primed_with_first_request_memory() {
    // The first execution writes a success record; the second request's
    // worker context should carry it.
    struct MemoryCountingWorker {
        seen: Arc<Mutex<Vec<usize>>>,
    }

    impl Worker for MemoryCountingWorker {
        fn name(&self) -> &str {
            "general"
        }

        fn capabilities(&self) -> &[String] {
            &[]
        }

        fn execute(&self, context: &WorkerContext) -> Result<WorkerOutcome> {
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(context.memory_hits.len());
            Ok(WorkerOutcome::new(serde_json::json!({"ok": true}), "done"))
        }
    }

    let store = Arc::new(SqliteStore::in_memory().expect("store"));
    let registry = Arc::new(WorkerRegistry::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    registry.register(Arc::new(MemoryCountingWorker {
        seen: Arc::clone(&seen),
    }));

    let plan = r#"[{"worker_name": "general", "description": "do it", "order": 1}]"#;
    let orchestrator = Orchestrator::new(
        registry,
        MemoryStore::new(Arc::<SqliteStore>::clone(&store)),
        Arc::<SqliteStore>::clone(&store),
        Arc::new(PlanProvider {
            plan: plan.to_string(),
        }),
        ForemanConfig::default(),
    );

    orchestrator
        .handle(&WorkRequest::new("first"))
        .expect("first result");
    orchestrator
        .handle(&WorkRequest::new("second"))
        .expect("second result");

    let seen = seen
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    assert_eq!(seen[0], 0);
    assert!(seen[1] >= 1, "second run should be primed, saw {seen:?}");
}
