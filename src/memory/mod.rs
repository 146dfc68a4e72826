//! The memory store.
//!
//! A durable log of what each worker did, how it went, and what users said
//! about it. Records are scored at write time ([`scoring`]) and aged by the
//! periodic decay sweep ([`decay`]).
//!
//! Memory failures must never fail the primary request path: reads degrade
//! to "no memory available" and writes offer a best-effort variant that
//! logs and swallows.

mod decay;
mod scoring;

pub use decay::{
    DECAY_EPSILON, DECAY_FLOOR, DECAY_PER_DAY, DecayConfig, DecayReport, DecaySweep, decay_factor,
};
pub use scoring::{
    BASE_RELEVANCE, FAST_EXECUTION_BOOST, NEGATIVE_SENTIMENT_BOOST, RelevanceSignals,
    SUBSTANTIAL_CONTENT_BOOST, SUBSTANTIAL_CONTENT_BYTES,
};

use crate::models::{MemoryKind, MemoryQuery, MemoryRecord, RecordId};
use crate::storage::MemoryBackend;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::warn;

/// Service for storing and retrieving worker memories.
#[derive(Clone)]
pub struct MemoryStore {
    backend: Arc<dyn MemoryBackend>,
}

impl MemoryStore {
    /// Creates a memory store over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn MemoryBackend> {
        Arc::clone(&self.backend)
    }

    /// Stores a new memory record.
    ///
    /// The relevance score is clamped to `[0.0, 1.0]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails. Request-path callers
    /// are expected to log and ignore it (see [`Self::store_best_effort`]).
    pub fn store(
        &self,
        worker_name: &str,
        kind: MemoryKind,
        content: serde_json::Value,
        tags: Vec<String>,
        relevance: f64,
    ) -> Result<RecordId> {
        if worker_name.trim().is_empty() {
            return Err(Error::InvalidInput("worker name cannot be empty".to_string()));
        }

        let now = crate::current_timestamp();
        let record = MemoryRecord {
            id: RecordId::new(format!("{}_{}", kind.as_str(), uuid::Uuid::new_v4())),
            worker_name: worker_name.to_string(),
            kind,
            content,
            tags,
            relevance: relevance.clamp(0.0, 1.0),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
        };

        self.backend.insert(&record)?;
        metrics::counter!("memory_records_stored_total", "kind" => kind.as_str()).increment(1);
        Ok(record.id)
    }

    /// Stores a record, logging and swallowing any failure.
    ///
    /// Used on the request path, where a memory write must never fail the
    /// request itself.
    pub fn store_best_effort(
        &self,
        worker_name: &str,
        kind: MemoryKind,
        content: serde_json::Value,
        tags: Vec<String>,
        relevance: f64,
    ) -> Option<RecordId> {
        match self.store(worker_name, kind, content, tags, relevance) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(worker_name, kind = kind.as_str(), error = %e, "Memory write failed");
                metrics::counter!("memory_write_failures_total").increment(1);
                None
            },
        }
    }

    /// Retrieves the most relevant records matching a query.
    ///
    /// Results are sorted by `(relevance desc, created_at desc)`; the tag
    /// filter is conjunctive. Storage errors degrade to an empty list —
    /// "no memory available" — rather than propagating. Access metadata is
    /// bumped best-effort on the returned records.
    #[must_use]
    pub fn retrieve(&self, query: &MemoryQuery) -> Vec<MemoryRecord> {
        let records = match self.backend.query(query) {
            Ok(records) => records,
            Err(e) => {
                warn!(worker_name = %query.worker_name, error = %e, "Memory read failed");
                metrics::counter!("memory_read_failures_total").increment(1);
                return Vec::new();
            },
        };

        if !records.is_empty() {
            let ids: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
            if let Err(e) = self.backend.touch(&ids, crate::current_timestamp()) {
                warn!(error = %e, "Failed to bump memory access metadata");
            }
        }

        metrics::counter!("memory_retrievals_total").increment(1);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(SqliteStore::in_memory().expect("store")))
    }

    #[test]
    fn test_store_then_retrieve_roundtrip() {
        let memory = store();
        let id = memory
            .store(
                "w",
                MemoryKind::Success,
                serde_json::json!({"summary": "done"}),
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
        assert!((hits[0].relevance - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_store_clamps_relevance() {
        let memory = store();
        memory
            .store("w", MemoryKind::Error, serde_json::json!({}), vec![], 3.5)
            .expect("store");

        let hits = memory.retrieve(&MemoryQuery::for_worker("w"));
        assert!((hits[0].relevance - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_store_rejects_empty_worker() {
        let memory = store();
        let result = memory.store("  ", MemoryKind::Success, serde_json::json!({}), vec![], 0.5);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_retrieve_bumps_access_count() {
        let memory = store();
        memory
            .store("w", MemoryKind::Success, serde_json::json!({}), vec![], 0.8)
            .expect("store");

        memory.retrieve(&MemoryQuery::for_worker("w"));
        let hits = memory.retrieve(&MemoryQuery::for_worker("w"));
        assert_eq!(hits[0].access_count, 1);
    }

    #[test]
    fn test_record_id_carries_kind_prefix() {
        let memory = store();
        let id = memory
            .store("w", MemoryKind::Insight, serde_json::json!({}), vec![], 0.9)
            .expect("store");
        assert!(id.as_str().starts_with("insight_"));
    }
}
