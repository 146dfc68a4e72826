//! Request analysis and decomposition.
//!
//! Both steps delegate to a reasoning call and degrade to deterministic
//! fallbacks on any failure: analysis falls back to the request's kind
//! hint (or `general`), decomposition to a single subtask. Neither step
//! can abort a request; the only fatal planning condition is a dependency
//! cycle that survives normalization.

use crate::llm::{LlmProvider, parse_json_response};
use crate::models::{Classification, Subtask, WorkRequest};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::warn;

/// System prompt for the analysis step.
const ANALYZE_SYSTEM_PROMPT: &str = "\
You are a task analyzer for a multi-worker orchestration system. Classify \
the user request and respond with JSON only:
{
  \"kind\": \"research|analysis|content|recommendation|general\",
  \"capabilities\": [\"...\"],
  \"complexity\": \"simple|moderate|complex\",
  \"subtask_kinds\": [\"...\"]
}";

/// System prompt for the decomposition step.
const DECOMPOSE_SYSTEM_PROMPT: &str = "\
You are a task decomposition expert. Break the request into subtasks for \
specialized workers. Available workers: research (web research, data \
gathering), analysis (data processing, insights), content (writing, \
copywriting), recommendation (strategic advice), general (anything else). \
Respond with a JSON array only:
[
  {
    \"worker_name\": \"research\",
    \"description\": \"specific, actionable instruction\",
    \"depends_on\": [\"subtask_1\"],
    \"order\": 1
  }
]
Each subtask must be actionable on its own; declare a dependency only when \
a subtask needs another subtask's output.";

/// One subtask as produced by the decomposition call, before normalization.
#[derive(Debug, Deserialize)]
struct PlannedSubtask {
    /// Target worker.
    #[serde(alias = "agent_type")]
    worker_name: String,
    /// Instruction text.
    description: String,
    /// Declared dependencies (ids or 1-based positions).
    #[serde(default, alias = "dependencies")]
    depends_on: Vec<String>,
    /// Declared execution rank; assigned from input position when absent.
    #[serde(default, alias = "execution_order")]
    order: Option<u32>,
}

/// Classifies a request's intent.
///
/// Never fails: a provider error or malformed response degrades to
/// [`Classification::fallback`].
pub fn analyze(llm: &dyn LlmProvider, request: &WorkRequest) -> Classification {
    let user = format!(
        "Query: {}\nKind hint: {}\nPriority: {}",
        request.query,
        request.kind.as_deref().unwrap_or("none"),
        request.priority
    );

    match llm
        .complete_with_system(ANALYZE_SYSTEM_PROMPT, &user)
        .and_then(|response| parse_json_response::<Classification>(&response, "analyze"))
    {
        Ok(classification) => classification,
        Err(e) => {
            warn!(request_id = %request.id, error = %e, "Analysis degraded to fallback");
            metrics::counter!("orchestrator_analysis_degraded_total").increment(1);
            Classification::fallback(request)
        },
    }
}

/// Decomposes a request into a normalized subtask plan.
///
/// A provider error or malformed response degrades to a single-subtask
/// fallback plan targeting `classification.kind`.
///
/// # Errors
///
/// Returns [`Error::PlanInvariant`] only when the produced plan contains a
/// dependency cycle that normalization cannot repair.
pub fn decompose(
    llm: &dyn LlmProvider,
    request: &WorkRequest,
    classification: &Classification,
) -> Result<Vec<Subtask>> {
    let user = format!(
        "Original query: {}\nClassification: {}\n\nBreak this down into subtasks.",
        request.query,
        serde_json::to_value(classification).unwrap_or(serde_json::Value::Null)
    );

    let planned = match llm
        .complete_with_system(DECOMPOSE_SYSTEM_PROMPT, &user)
        .and_then(|response| parse_json_response::<Vec<PlannedSubtask>>(&response, "decompose"))
    {
        Ok(planned) if !planned.is_empty() => planned,
        Ok(_) | Err(_) => {
            warn!(request_id = %request.id, "Decomposition degraded to single-subtask fallback");
            metrics::counter!("orchestrator_decomposition_degraded_total").increment(1);
            vec![PlannedSubtask {
                worker_name: classification.kind.clone(),
                description: request.query.clone(),
                depends_on: Vec::new(),
                order: Some(1),
            }]
        },
    };

    normalize(planned)
}

/// Normalizes a raw plan into executable subtasks.
///
/// Assigns ids (`subtask_N` by input position), resolves positional
/// dependency references, and orders the list so that every subtask runs
/// after its dependencies — a stable topological sort using the declared
/// `order` (ties broken by input position). Dependencies on ids outside
/// the plan are kept verbatim; they can never complete and fail at
/// execution time instead.
fn normalize(planned: Vec<PlannedSubtask>) -> Result<Vec<Subtask>> {
    let ids: Vec<String> = (1..=planned.len()).map(|i| format!("subtask_{i}")).collect();
    let known: HashSet<&String> = ids.iter().collect();

    let mut nodes: Vec<Subtask> = planned
        .into_iter()
        .enumerate()
        .map(|(index, p)| {
            let mut subtask = Subtask::new(
                ids[index].clone(),
                p.worker_name,
                p.description,
                p.order.unwrap_or_else(|| saturating_rank(index)),
            );
            subtask.depends_on = p
                .depends_on
                .into_iter()
                .map(|dep| resolve_positional(&dep, &ids))
                .filter(|dep| dep != &subtask.id)
                .collect();
            subtask
        })
        .collect();

    // Stable topological sort: among ready nodes, lowest declared order
    // first, input position as the tie-break.
    let mut emitted: HashSet<String> = HashSet::new();
    let mut ordered: Vec<usize> = Vec::with_capacity(nodes.len());
    let mut remaining: Vec<usize> = (0..nodes.len()).collect();

    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .copied()
            .filter(|&i| {
                nodes[i]
                    .depends_on
                    .iter()
                    .all(|dep| emitted.contains(dep) || !known.contains(dep))
            })
            .min_by_key(|&i| (nodes[i].order, i));

        let Some(next) = next else {
            let stuck: Vec<&str> = remaining.iter().map(|&i| nodes[i].id.as_str()).collect();
            return Err(Error::PlanInvariant(format!(
                "dependency cycle among subtasks: {}",
                stuck.join(", ")
            )));
        };

        emitted.insert(nodes[next].id.clone());
        ordered.push(next);
        remaining.retain(|&i| i != next);
    }

    // Reassign contiguous ranks in final order.
    let mut result: Vec<Subtask> = Vec::with_capacity(ordered.len());
    for (rank, index) in ordered.iter().enumerate() {
        let mut subtask = nodes[*index].clone();
        subtask.order = saturating_rank(rank);
        result.push(subtask);
    }
    Ok(result)
}

/// Converts a 0-based position into a 1-based rank, saturating.
fn saturating_rank(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX - 1).saturating_add(1)
}

/// Resolves bare positional references (`"1"`, `"2"`) to subtask ids.
fn resolve_positional(dep: &str, ids: &[String]) -> String {
    dep.parse::<usize>().map_or_else(
        |_| dep.to_string(),
        |position| {
            position
                .checked_sub(1)
                .and_then(|i| ids.get(i))
                .cloned()
                .unwrap_or_else(|| dep.to_string())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    struct StaticProvider {
        response: Option<String>,
    }

    impl StaticProvider {
        fn responding(response: &str) -> Self {
            Self {
                response: Some(response.to_string()),
            }
        }

        const fn failing() -> Self {
            Self { response: None }
        }
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

    fn request() -> WorkRequest {
        WorkRequest {
            id: "req_1".to_string(),
            query: "research the market and write a post".to_string(),
            kind: None,
            priority: Priority::Medium,
            created_at: 0,
        }
    }

    #[test]
    fn test_analyze_fallback_on_provider_failure() {
        let classification = analyze(&StaticProvider::failing(), &request());
        assert_eq!(classification.kind, "general");
    }

    #[test]
    fn test_analyze_fallback_on_malformed_json() {
        let classification = analyze(&StaticProvider::responding("no json here"), &request());
        assert_eq!(classification.kind, "general");
    }

    #[test]
    fn test_analyze_parses_response() {
        let provider = StaticProvider::responding(
            r#"{"kind": "research", "capabilities": ["web_research"], "complexity": "simple"}"#,
        );
        let classification = analyze(&provider, &request());
        assert_eq!(classification.kind, "research");
    }

    #[test]
    fn test_decompose_fallback_is_single_subtask() {
        let request = request();
        let classification = Classification::fallback(&request);
        let plan = decompose(&StaticProvider::failing(), &request, &classification)
            .expect("plan");

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, "subtask_1");
        assert_eq!(plan[0].worker_name, "general");
        assert_eq!(plan[0].description, request.query);
        assert_eq!(plan[0].order, 1);
    }

    #[test]
    fn test_decompose_parses_and_orders_plan() {
        let request = request();
        let classification = Classification::fallback(&request);
        let provider = StaticProvider::responding(
            r#"[
                {"worker_name": "research", "description": "find data", "order": 1},
                {"worker_name": "content", "description": "write post", "depends_on": ["subtask_1"], "order": 2}
            ]"#,
        );

        let plan = decompose(&provider, &request, &classification).expect("plan");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].worker_name, "research");
        assert_eq!(plan[0].id, "subtask_1");
        assert_eq!(plan[1].worker_name, "content");
        assert_eq!(plan[1].depends_on, vec!["subtask_1".to_string()]);
        assert_eq!(plan[1].order, 2);
    }

    #[test]
    fn test_normalize_reorders_dependency_before_dependent() {
        // Declared order says the dependent runs first; normalization must
        // put the dependency ahead of it regardless.
        let planned = vec![
            PlannedSubtask {
                worker_name: "content".to_string(),
                description: "write".to_string(),
                depends_on: vec!["subtask_2".to_string()],
                order: Some(1),
            },
            PlannedSubtask {
                worker_name: "research".to_string(),
                description: "gather".to_string(),
                depends_on: vec![],
                order: Some(2),
            },
        ];

        let plan = normalize(planned).expect("plan");
        assert_eq!(plan[0].worker_name, "research");
        assert_eq!(plan[1].worker_name, "content");
        assert_eq!(plan[0].order, 1);
        assert_eq!(plan[1].order, 2);
    }

    #[test]
    fn test_normalize_equal_orders_keep_input_order() {
        let planned = vec![
            PlannedSubtask {
                worker_name: "first".to_string(),
                description: "a".to_string(),
                depends_on: vec![],
                order: Some(1),
            },
            PlannedSubtask {
                worker_name: "second".to_string(),
                description: "b".to_string(),
                depends_on: vec![],
                order: Some(1),
            },
        ];

        let plan = normalize(planned).expect("plan");
        assert_eq!(plan[0].worker_name, "first");
        assert_eq!(plan[1].worker_name, "second");
    }

    #[test]
    fn test_normalize_resolves_positional_dependencies() {
        let planned = vec![
            PlannedSubtask {
                worker_name: "research".to_string(),
                description: "gather".to_string(),
                depends_on: vec![],
                order: None,
            },
            PlannedSubtask {
                worker_name: "content".to_string(),
                description: "write".to_string(),
                depends_on: vec!["1".to_string()],
                order: None,
            },
        ];

        let plan = normalize(planned).expect("plan");
        assert_eq!(plan[1].depends_on, vec!["subtask_1".to_string()]);
    }

    #[test]
    fn test_normalize_cycle_is_fatal() {
        let planned = vec![
            PlannedSubtask {
                worker_name: "a".to_string(),
                description: "a".to_string(),
                depends_on: vec!["subtask_2".to_string()],
                order: Some(1),
            },
            PlannedSubtask {
                worker_name: "b".to_string(),
                description: "b".to_string(),
                depends_on: vec!["subtask_1".to_string()],
                order: Some(2),
            },
        ];

        match normalize(planned) {
            Err(Error::PlanInvariant(message)) => assert!(message.contains("cycle")),
            other => panic!("expected PlanInvariant, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_keeps_unknown_dependencies() {
        let planned = vec![PlannedSubtask {
            worker_name: "a".to_string(),
            description: "a".to_string(),
            depends_on: vec!["subtask_99".to_string()],
            order: Some(1),
        }];

        let plan = normalize(planned).expect("plan");
        // Kept verbatim; resolved as a runtime dependency failure instead.
        assert_eq!(plan[0].depends_on, vec!["subtask_99".to_string()]);
    }

    #[test]
    fn test_normalize_drops_self_dependency() {
        let planned = vec![PlannedSubtask {
            worker_name: "a".to_string(),
            description: "a".to_string(),
            depends_on: vec!["subtask_1".to_string()],
            order: Some(1),
        }];

        let plan = normalize(planned).expect("plan");
        assert!(plan[0].depends_on.is_empty());
    }
}
