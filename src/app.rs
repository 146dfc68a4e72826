//! Application context wiring.
//!
//! Everything shared is constructed exactly once here and passed by
//! reference: the storage backends, the worker registry, the LLM
//! provider, and the services built on them. There is no module-level
//! state anywhere in the crate.

use crate::config::ForemanConfig;
use crate::learning::{Analytics, LearningLoop};
use crate::llm::{self, LlmProvider};
use crate::memory::{DecayConfig, DecaySweep, MemoryStore};
use crate::orchestrator::Orchestrator;
use crate::scheduler::{BackoffPolicy, Scheduler};
use crate::storage::SqliteStore;
use crate::workers::{WorkerRegistry, register_builtin_workers};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// The wired application: one instance per process.
pub struct AppContext {
    /// Resolved configuration.
    pub config: ForemanConfig,
    /// Shared storage (implements all three backend traits).
    pub store: Arc<SqliteStore>,
    /// The worker registry, populated with the built-in workers.
    pub registry: Arc<WorkerRegistry>,
    /// The memory store service.
    pub memory: MemoryStore,
    /// The request orchestrator.
    pub orchestrator: Orchestrator,
    /// The learning loop.
    pub learning: LearningLoop,
    /// Usage analytics.
    pub analytics: Analytics,
}

impl AppContext {
    /// Builds the context from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or database cannot be
    /// prepared.
    pub fn new(config: ForemanConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| Error::OperationFailed {
            operation: "create_data_dir".to_string(),
            cause: format!("{}: {e}", config.data_dir.display()),
        })?;
        let store = Arc::new(SqliteStore::new(config.db_path())?);
        Self::with_store(config, store)
    }

    /// Builds the context over an existing store (in-memory in tests).
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for parity with [`Self::new`].
    pub fn with_store(config: ForemanConfig, store: Arc<SqliteStore>) -> Result<Self> {
        let llm = llm::build_provider(&config.llm);
        Self::with_provider(config, store, llm)
    }

    /// Builds the context with an explicit provider (test doubles).
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for parity with [`Self::new`].
    pub fn with_provider(
        config: ForemanConfig,
        store: Arc<SqliteStore>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let registry = Arc::new(WorkerRegistry::new());
        register_builtin_workers(&registry, &llm);

        let memory = MemoryStore::new(Arc::<SqliteStore>::clone(&store));

        let orchestrator = Orchestrator::new(
            Arc::clone(&registry),
            memory.clone(),
            Arc::<SqliteStore>::clone(&store),
            Arc::clone(&llm),
            config.clone(),
        );

        let learning = LearningLoop::new(
            memory.clone(),
            Arc::<SqliteStore>::clone(&store),
            Arc::<SqliteStore>::clone(&store),
            Arc::clone(&llm),
            config.learning.clone(),
        );

        let analytics = Analytics::new(
            Arc::<SqliteStore>::clone(&store),
            Arc::<SqliteStore>::clone(&store),
            Arc::<SqliteStore>::clone(&store),
        );

        Ok(Self {
            config,
            store,
            registry,
            memory,
            orchestrator,
            learning,
            analytics,
        })
    }

    /// Builds a decay sweep bound to this context's configuration.
    #[must_use]
    pub fn decay_sweep(&self) -> DecaySweep {
        let decay_config = DecayConfig::new()
            .with_cutoff_days(self.config.memory.decay_cutoff_days)
            .with_min_relevance(self.config.memory.decay_min_relevance);
        DecaySweep::new(self.memory.backend(), decay_config)
    }

    /// Builds the background scheduler with the standard periodic jobs:
    /// learning cycle, decay sweep, and usage analytics.
    ///
    /// The returned scheduler is not started; the embedding process owns
    /// its lifecycle.
    #[must_use]
    pub fn build_scheduler(self: &Arc<Self>) -> Scheduler {
        let policy = BackoffPolicy {
            max_retries: self.config.learning.max_retries,
            base_delay_ms: self.config.learning.retry_base_delay_ms,
        };
        let mut scheduler = Scheduler::new();

        let ctx = Arc::clone(self);
        scheduler.add_job(
            "learning-cycle",
            Duration::from_secs(self.config.scheduler.cycle_interval_secs),
            policy,
            move || {
                let summary = ctx.learning.run_cycle(None);
                tracing::info!(summary = %summary.summary(), "Scheduled learning cycle finished");
                Ok(())
            },
        );

        let ctx = Arc::clone(self);
        scheduler.add_job(
            "memory-decay",
            Duration::from_secs(self.config.scheduler.decay_interval_secs),
            policy,
            move || {
                let report = ctx.decay_sweep().run(false)?;
                tracing::info!(summary = %report.summary(), "Scheduled decay sweep finished");
                Ok(())
            },
        );

        let ctx = Arc::clone(self);
        let window_days = self.config.learning.activity_window_days;
        scheduler.add_job(
            "usage-analytics",
            Duration::from_secs(self.config.scheduler.analytics_interval_secs),
            policy,
            move || {
                let report = ctx.analytics.usage_report(window_days)?;
                tracing::info!(
                    workers = report.workers.len(),
                    top_performers = report.top_performers.len(),
                    "Scheduled analytics aggregation finished"
                );
                Ok(())
            },
        );

        scheduler
    }
}
