//! Property-based tests for relevance scoring and decay.

use foreman::memory::{DecayConfig, DecaySweep, RelevanceSignals, decay_factor};
use foreman::models::{MemoryKind, MemoryQuery, MemoryRecord, RecordId};
use foreman::storage::{MemoryBackend, SqliteStore};
use proptest::prelude::*;
use std::sync::Arc;

fn record_with(relevance: f64, age_days: u64) -> MemoryRecord {
    let now = foreman::current_timestamp();
    MemoryRecord {
        id: RecordId::new(format!("rec_{relevance}_{age_days}")),
        worker_name: "w".to_string(),
        kind: MemoryKind::Success,
        content: serde_json::json!({}),
        tags: vec![],
        relevance,
        created_at: now.saturating_sub(age_days * 86_400),
        last_accessed_at: now,
        access_count: 0,
    }
}

proptest! {
    /// The decay multiplier never exceeds 1, so relevance cannot rise.
    #[test]
    fn decay_factor_never_amplifies(age_days in 0_u64..10_000) {
        let factor = decay_factor(age_days);
        prop_assert!(factor <= 1.0);
        prop_assert!(factor >= 0.1);
    }

    /// Repeated sweeps are monotonically non-increasing for any record
    /// that is not rewritten.
    #[test]
    fn repeated_decay_is_monotonic(
        relevance in 0.0_f64..=1.0,
        age_days in 0_u64..400,
    ) {
        let store = Arc::new(SqliteStore::in_memory().map_err(|e| {
            TestCaseError::fail(e.to_string())
        })?);
        store
            .insert(&record_with(relevance, age_days))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        // Deletion disabled (relevance floor at zero): the property being
        // observed is the update path, not vacuous emptiness.
        let sweep = DecaySweep::new(
            Arc::<SqliteStore>::clone(&store),
            DecayConfig::new().with_cutoff_days(100_000).with_min_relevance(0.0),
        );

        let mut last = relevance;
        for _ in 0..3 {
            sweep.run(false).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let records = store
                .query(&MemoryQuery::for_worker("w"))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(records.len(), 1);
            prop_assert!(records[0].relevance <= last + 1e-12);
            last = records[0].relevance;
        }
    }

    /// Deletion requires BOTH conditions: older than the cutoff AND below
    /// the relevance floor. Either alone keeps the record.
    #[test]
    fn deletion_is_a_conjunction(
        relevance in 0.0_f64..=1.0,
        // The exact cutoff boundary is excluded: a clock tick between
        // insert and sweep would make it ambiguous.
        age_days in prop_oneof![0_u64..90, 91_u64..200],
    ) {
        let cutoff_days = 90_u32;
        let floor = 0.3_f64;

        let store = Arc::new(SqliteStore::in_memory().map_err(|e| {
            TestCaseError::fail(e.to_string())
        })?);
        store
            .insert(&record_with(relevance, age_days))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let sweep = DecaySweep::new(
            Arc::<SqliteStore>::clone(&store),
            DecayConfig::new()
                .with_cutoff_days(cutoff_days)
                .with_min_relevance(floor),
        );
        sweep.run(false).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let remaining = store
            .query(&MemoryQuery::for_worker("w"))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let expect_deleted = age_days > u64::from(cutoff_days) && relevance < floor;
        if expect_deleted {
            prop_assert!(remaining.is_empty());
        } else {
            prop_assert_eq!(remaining.len(), 1);
        }
    }

    /// The write-time score is always inside [0, 1] and never below base.
    #[test]
    fn relevance_score_is_clamped(
        negative in any::<bool>(),
        substantial in any::<bool>(),
        fast in any::<bool>(),
    ) {
        let score = RelevanceSignals {
            negative_sentiment: negative,
            substantial_content: substantial,
            faster_than_average: fast,
        }
        .score();
        prop_assert!((0.0..=1.0).contains(&score));
        prop_assert!(score >= 0.7 - 1e-12);
    }
}
