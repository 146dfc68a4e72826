//! Relevance decay sweep.
//!
//! Identifies and deletes memory records that are both old and
//! low-relevance, and ages the relevance of surviving records. Scheduled
//! from the background path; safe to run concurrently with request
//! handling (relevance updates are whole-value writes).
//!
//! # Configuration
//!
//! Decay can be configured via:
//! - Environment variables: `FOREMAN_DECAY_CUTOFF_DAYS`, `FOREMAN_DECAY_MIN_RELEVANCE`
//! - Config file: `[memory] decay_cutoff_days = 90`, `decay_min_relevance = 0.3`

use crate::Result;
use crate::storage::MemoryBackend;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Environment variable for the deletion cutoff age in days.
pub const DECAY_CUTOFF_DAYS_ENV: &str = "FOREMAN_DECAY_CUTOFF_DAYS";

/// Environment variable for the low-relevance deletion threshold.
pub const DECAY_MIN_RELEVANCE_ENV: &str = "FOREMAN_DECAY_MIN_RELEVANCE";

/// Default deletion cutoff age in days.
pub const DEFAULT_CUTOFF_DAYS: u32 = 90;

/// Default low-relevance deletion threshold.
pub const DEFAULT_MIN_RELEVANCE: f64 = 0.3;

/// Daily relevance decay rate (1% per day).
pub const DECAY_PER_DAY: f64 = 0.01;

/// Floor for the decay multiplier (relevance never drops below 10% per sweep).
pub const DECAY_FLOOR: f64 = 0.1;

/// Minimum relevance change worth persisting.
///
/// Smaller deltas are skipped to avoid write amplification on every sweep.
pub const DECAY_EPSILON: f64 = 0.05;

const SECONDS_PER_DAY: u64 = 86_400;

/// Safely converts Duration to milliseconds as u64, capping at `u64::MAX`.
#[inline]
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts usize to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn usize_to_f64(value: usize) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

/// Converts u64 to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn u64_to_f64(value: u64) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

/// Computes the decay multiplier for a record of the given age.
///
/// `max(0.1, 1 - age_days * 0.01)` — never above 1.0, so repeated sweeps
/// are monotonically non-increasing.
#[must_use]
pub fn decay_factor(age_days: u64) -> f64 {
    let age = u32::try_from(age_days).unwrap_or(u32::MAX);
    DECAY_FLOOR.max(f64::from(age).mul_add(-DECAY_PER_DAY, 1.0))
}

/// Decay sweep configuration.
#[derive(Debug, Clone)]
pub struct DecayConfig {
    /// Records older than this many days become deletion candidates.
    pub cutoff_days: u32,
    /// Deletion also requires relevance below this threshold.
    pub min_relevance_to_keep: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            cutoff_days: DEFAULT_CUTOFF_DAYS,
            min_relevance_to_keep: DEFAULT_MIN_RELEVANCE,
        }
    }
}

impl DecayConfig {
    /// Creates a decay config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decay config from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(days) = std::env::var(DECAY_CUTOFF_DAYS_ENV)
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.cutoff_days = days;
        }
        if let Some(min) = std::env::var(DECAY_MIN_RELEVANCE_ENV)
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
        {
            config.min_relevance_to_keep = min.clamp(0.0, 1.0);
        }
        config
    }

    /// Sets the cutoff age.
    #[must_use]
    pub const fn with_cutoff_days(mut self, days: u32) -> Self {
        self.cutoff_days = days;
        self
    }

    /// Sets the deletion relevance threshold.
    #[must_use]
    pub const fn with_min_relevance(mut self, min_relevance: f64) -> Self {
        self.min_relevance_to_keep = min_relevance;
        self
    }

    /// Returns the deletion cutoff timestamp relative to `now`.
    #[must_use]
    pub fn cutoff_timestamp(&self, now: u64) -> u64 {
        now.saturating_sub(u64::from(self.cutoff_days) * SECONDS_PER_DAY)
    }
}

/// Result of one decay sweep.
#[derive(Debug, Clone, Default)]
pub struct DecayReport {
    /// Records checked for aging.
    pub records_checked: usize,
    /// Records that were (or would be) deleted.
    pub records_deleted: usize,
    /// Breakdown of deleted records by kind.
    pub deleted_by_kind: HashMap<String, usize>,
    /// Surviving records whose relevance was rewritten.
    pub relevance_updated: usize,
    /// Whether this was a dry run (no changes made).
    pub dry_run: bool,
    /// Duration of the sweep in milliseconds.
    pub duration_ms: u64,
}

impl DecayReport {
    /// Returns a human-readable summary of the sweep.
    #[must_use]
    pub fn summary(&self) -> String {
        let action = if self.dry_run { "would delete" } else { "deleted" };
        format!(
            "{} {} stale records, updated {} relevance scores ({} checked in {}ms)",
            action,
            self.records_deleted,
            self.relevance_updated,
            self.records_checked,
            self.duration_ms
        )
    }
}

/// Sweeps stale records out of a memory backend and ages the survivors.
///
/// Holds an `Arc` reference to the backend, making it safe to share with
/// the scheduler thread.
pub struct DecaySweep {
    backend: Arc<dyn MemoryBackend>,
    config: DecayConfig,
}

impl DecaySweep {
    /// Creates a new decay sweep.
    #[must_use]
    pub fn new(backend: Arc<dyn MemoryBackend>, config: DecayConfig) -> Self {
        Self { backend, config }
    }

    /// Returns the sweep configuration.
    #[must_use]
    pub const fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Runs one sweep.
    ///
    /// 1. Deletes records older than the cutoff **and** below the relevance
    ///    threshold (both conditions required; either alone keeps a record
    ///    alive).
    /// 2. Recalculates relevance for surviving records younger than the
    ///    cutoff, persisting only changes larger than [`DECAY_EPSILON`].
    ///
    /// # Errors
    ///
    /// Returns an error if backend operations fail.
    #[instrument(
        name = "foreman.memory.decay",
        skip(self),
        fields(dry_run = dry_run, cutoff_days = self.config.cutoff_days)
    )]
    pub fn run(&self, dry_run: bool) -> Result<DecayReport> {
        let start = Instant::now();
        let now = crate::current_timestamp();
        let cutoff = self.config.cutoff_timestamp(now);

        let mut report = DecayReport {
            dry_run,
            ..Default::default()
        };

        // Phase 1: delete old low-relevance records.
        for (kind, count) in self
            .backend
            .stale_counts(cutoff, self.config.min_relevance_to_keep)?
        {
            if count > 0 {
                report.deleted_by_kind.insert(kind.as_str().to_string(), count);
            }
        }
        if dry_run {
            report.records_deleted = report.deleted_by_kind.values().sum();
        } else {
            report.records_deleted = self
                .backend
                .delete_stale(cutoff, self.config.min_relevance_to_keep)?;
        }

        // Phase 2: age the survivors younger than the cutoff.
        for record in self.backend.list_decayable(cutoff)? {
            report.records_checked += 1;

            let age_days = now.saturating_sub(record.created_at) / SECONDS_PER_DAY;
            let aged = record.relevance * decay_factor(age_days);
            if (record.relevance - aged).abs() <= DECAY_EPSILON {
                continue;
            }

            debug!(
                record_id = %record.id,
                relevance = record.relevance,
                aged,
                age_days,
                "Aging record relevance"
            );

            if dry_run {
                report.relevance_updated += 1;
                continue;
            }

            match self.backend.set_relevance(&record.id, aged) {
                Ok(()) => report.relevance_updated += 1,
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Failed to age record relevance");
                },
            }
        }

        report.duration_ms = duration_to_millis(start.elapsed());

        metrics::counter!("memory_decay_runs_total", "dry_run" => dry_run.to_string())
            .increment(1);
        metrics::gauge!("memory_decay_deleted").set(usize_to_f64(report.records_deleted));
        metrics::gauge!("memory_decay_checked").set(usize_to_f64(report.records_checked));
        metrics::histogram!("memory_decay_duration_ms").record(u64_to_f64(report.duration_ms));

        info!(
            records_checked = report.records_checked,
            records_deleted = report.records_deleted,
            relevance_updated = report.relevance_updated,
            duration_ms = report.duration_ms,
            dry_run,
            "Decay sweep completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemoryKind, MemoryQuery, MemoryRecord, RecordId};
    use crate::storage::SqliteStore;

    fn record_aged(id: &str, relevance: f64, age_days: u64) -> MemoryRecord {
        let now = crate::current_timestamp();
        MemoryRecord {
            id: RecordId::new(id),
            worker_name: "w".to_string(),
            kind: MemoryKind::Success,
            content: serde_json::json!({"note": id}),
            tags: vec![],
            relevance,
            created_at: now - age_days * 86_400,
            last_accessed_at: now,
            access_count: 0,
        }
    }

    fn sweep_with(config: DecayConfig) -> (Arc<SqliteStore>, DecaySweep) {
        let store = Arc::new(SqliteStore::in_memory().expect("store"));
        let sweep = DecaySweep::new(Arc::<SqliteStore>::clone(&store), config);
        (store, sweep)
    }

    #[test]
    fn test_decay_factor_floor() {
        assert!((decay_factor(0) - 1.0).abs() < f64::EPSILON);
        assert!((decay_factor(30) - 0.7).abs() < 1e-9);
        assert!((decay_factor(90) - 0.1).abs() < 1e-9);
        assert!((decay_factor(500) - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deletion_requires_both_conditions() {
        let (store, sweep) = sweep_with(DecayConfig::new().with_cutoff_days(90).with_min_relevance(0.3));

        store.insert(&record_aged("old_low", 0.2, 100)).expect("insert");
        store.insert(&record_aged("old_high", 0.5, 100)).expect("insert");
        store.insert(&record_aged("young_low", 0.2, 10)).expect("insert");

        let report = sweep.run(false).expect("sweep");
        assert_eq!(report.records_deleted, 1);
        assert_eq!(report.deleted_by_kind.get("success"), Some(&1));

        let remaining = store
            .query(&MemoryQuery::for_worker("w"))
            .expect("query");
        let ids: Vec<&str> = remaining.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"old_high"));
        assert!(ids.contains(&"young_low"));
    }

    #[test]
    fn test_dry_run_makes_no_changes() {
        let (store, sweep) = sweep_with(DecayConfig::default());

        store.insert(&record_aged("old_low", 0.2, 100)).expect("insert");
        store.insert(&record_aged("aging", 0.8, 30)).expect("insert");

        let report = sweep.run(true).expect("sweep");
        assert!(report.dry_run);
        assert_eq!(report.records_deleted, 1);
        assert!(report.relevance_updated >= 1);

        let remaining = store.query(&MemoryQuery::for_worker("w")).expect("query");
        assert_eq!(remaining.len(), 2);
        let aging = remaining
            .iter()
            .find(|r| r.id.as_str() == "aging")
            .expect("aging record");
        assert!((aging.relevance - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_survivors_age_by_one_percent_per_day() {
        let (store, sweep) = sweep_with(DecayConfig::default());

        store.insert(&record_aged("aging", 0.8, 30)).expect("insert");

        sweep.run(false).expect("sweep");

        let remaining = store.query(&MemoryQuery::for_worker("w")).expect("query");
        // 0.8 * (1 - 30 * 0.01) = 0.56
        assert!((remaining[0].relevance - 0.56).abs() < 1e-6);
    }

    #[test]
    fn test_small_changes_skip_persistence() {
        let (store, sweep) = sweep_with(DecayConfig::default());

        // 2 days: 0.8 * 0.98 = 0.784, delta 0.016 < epsilon.
        store.insert(&record_aged("fresh", 0.8, 2)).expect("insert");

        let report = sweep.run(false).expect("sweep");
        assert_eq!(report.relevance_updated, 0);

        let remaining = store.query(&MemoryQuery::for_worker("w")).expect("query");
        assert!((remaining[0].relevance - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_repeated_sweeps_never_increase_relevance() {
        let (store, sweep) = sweep_with(DecayConfig::default());

        store.insert(&record_aged("aging", 0.9, 45)).expect("insert");

        let mut last = 0.9;
        for _ in 0..5 {
            sweep.run(false).expect("sweep");
            let records = store.query(&MemoryQuery::for_worker("w")).expect("query");
            assert!(records[0].relevance <= last + f64::EPSILON);
            last = records[0].relevance;
        }
    }
}
