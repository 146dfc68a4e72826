//! Worker registry.
//!
//! An explicit in-memory map from name to worker, built once at startup
//! from a fixed list of implementations. Reads are concurrent;
//! registration takes the single writer lock. No other side effects.

use super::Worker;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Introspection entry for one registered worker.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerDescriptor {
    /// Registry key.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Advertised capability tags.
    pub capabilities: Vec<String>,
}

/// Registry of named workers.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, Arc<dyn Worker>>>,
}

impl WorkerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a worker under its name.
    ///
    /// Idempotent by name: registering the same name twice keeps the most
    /// recent instance (supports hot-reload during tests).
    pub fn register(&self, worker: Arc<dyn Worker>) {
        let name = worker.name().to_string();
        let mut workers = self
            .workers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if workers.insert(name.clone(), worker).is_some() {
            tracing::debug!(worker = %name, "Replaced existing worker registration");
        }
    }

    /// Looks up a worker by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerNotFound`] for unknown names, so the
    /// orchestrator can skip-and-continue instead of aborting.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Worker>> {
        let workers = self
            .workers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        workers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::WorkerNotFound(name.to_string()))
    }

    /// Returns all workers advertising a capability tag.
    #[must_use]
    pub fn by_capability(&self, capability: &str) -> Vec<Arc<dyn Worker>> {
        let workers = self
            .workers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut matches: Vec<Arc<dyn Worker>> = workers
            .values()
            .filter(|w| w.capabilities().iter().any(|c| c == capability))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name().cmp(b.name()));
        matches
    }

    /// Returns descriptors for every registered worker, sorted by name.
    #[must_use]
    pub fn descriptors(&self) -> Vec<WorkerDescriptor> {
        let workers = self
            .workers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut descriptors: Vec<WorkerDescriptor> = workers
            .values()
            .map(|w| WorkerDescriptor {
                name: w.name().to_string(),
                description: w.description().to_string(),
                capabilities: w.capabilities().to_vec(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Number of registered workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when no workers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
