//! Storage backends.

mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::{FeedbackBackend, MemoryBackend, TaskBackend, WorkerStats, WorkerUsage};
