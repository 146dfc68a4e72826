//! `SQLite` storage backend.
//!
//! One database file backs all three storage concerns (memory records,
//! feedback, requests/subtasks/worker stats). The connection lives behind a
//! `Mutex` with poison recovery; every public method is a single critical
//! section, so concurrent request handling and background sweeps serialize
//! at the connection and never observe torn writes.

use crate::models::{
    FeedbackItem, MemoryKind, MemoryQuery, MemoryRecord, RecordId, Subtask, WorkRequest,
};
use crate::storage::traits::{
    FeedbackBackend, MemoryBackend, TaskBackend, WorkerStats, WorkerUsage,
};
use crate::{Error, Result};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Helper to acquire the connection lock with poison recovery.
///
/// If the mutex is poisoned (a panic in a previous critical section), we
/// recover the inner value and log a warning; the connection state is still
/// valid for subsequent statements.
fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("storage_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Escapes SQL LIKE wildcards so tag tokens match literally.
///
/// Uses `\` as the escape character (requires `ESCAPE '\'` in the LIKE
/// clause).
fn escape_like_wildcards(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            },
            _ => result.push(c),
        }
    }
    result
}

/// Encodes a tag list as a comma-wrapped token string (`,a,b,`).
///
/// The wrapping commas let a conjunctive filter match whole tokens with
/// `LIKE '%,tag,%'`.
fn encode_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(",{},", tags.join(","))
    }
}

/// Decodes a comma-wrapped token string back into a tag list.
fn decode_tags(encoded: &str) -> Vec<String> {
    encoded
        .split(',')
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn op_err(operation: &str, cause: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: cause.to_string(),
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// SQLite-backed store implementing all three backend traits.
pub struct SqliteStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

struct MemoryRow {
    id: String,
    worker_name: String,
    kind: String,
    content: String,
    tags: String,
    relevance: f64,
    created_at: i64,
    last_accessed_at: i64,
    access_count: i64,
}

fn build_record_from_row(row: MemoryRow) -> MemoryRecord {
    MemoryRecord {
        id: RecordId::new(row.id),
        worker_name: row.worker_name,
        kind: MemoryKind::parse(&row.kind),
        content: serde_json::from_str(&row.content).unwrap_or(serde_json::Value::Null),
        tags: decode_tags(&row.tags),
        relevance: row.relevance,
        created_at: to_u64(row.created_at),
        last_accessed_at: to_u64(row.last_accessed_at),
        access_count: to_u64(row.access_count),
    }
}

const MEMORY_COLUMNS: &str =
    "id, worker_name, kind, content, tags, relevance, created_at, last_accessed_at, access_count";

impl SqliteStore {
    /// Creates a new `SQLite` store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| op_err("open_sqlite", e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| op_err("open_sqlite_memory", e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Creates tables and indexes.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS memory_records (
                id               TEXT PRIMARY KEY,
                worker_name      TEXT NOT NULL,
                kind             TEXT NOT NULL,
                content          TEXT NOT NULL,
                tags             TEXT NOT NULL DEFAULT '',
                request_id       TEXT,
                relevance        REAL NOT NULL,
                created_at       INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                access_count     INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_memory_worker_kind
                ON memory_records(worker_name, kind);
            CREATE INDEX IF NOT EXISTS idx_memory_relevance
                ON memory_records(relevance, created_at);
            CREATE INDEX IF NOT EXISTS idx_memory_request
                ON memory_records(request_id);

            CREATE TABLE IF NOT EXISTS feedback (
                id          TEXT PRIMARY KEY,
                request_id  TEXT NOT NULL,
                worker_name TEXT NOT NULL,
                rating      INTEGER NOT NULL,
                comment     TEXT,
                processed   INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_feedback_request ON feedback(request_id);
            CREATE INDEX IF NOT EXISTS idx_feedback_worker ON feedback(worker_name, created_at);

            CREATE TABLE IF NOT EXISTS requests (
                id         TEXT PRIMARY KEY,
                query      TEXT NOT NULL,
                kind       TEXT,
                priority   TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subtasks (
                request_id     TEXT NOT NULL,
                id             TEXT NOT NULL,
                worker_name    TEXT NOT NULL,
                description    TEXT NOT NULL,
                depends_on     TEXT NOT NULL DEFAULT '',
                exec_order     INTEGER NOT NULL,
                status         TEXT NOT NULL,
                result         TEXT,
                failure_reason TEXT,
                error          TEXT,
                started_at     INTEGER,
                completed_at   INTEGER,
                PRIMARY KEY (request_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_subtasks_worker
                ON subtasks(worker_name, completed_at);

            CREATE TABLE IF NOT EXISTS worker_stats (
                worker_name           TEXT PRIMARY KEY,
                total_executions      INTEGER NOT NULL DEFAULT 0,
                successful_executions INTEGER NOT NULL DEFAULT 0,
                total_duration_ms     INTEGER NOT NULL DEFAULT 0,
                last_execution_at     INTEGER
            );
            ",
        )
        .map_err(|e| op_err("initialize_schema", e))?;
        Ok(())
    }

    /// Builds the WHERE clause and parameters for a memory query.
    ///
    /// Returns the clause (without `WHERE`) and the positional parameters,
    /// numbered from `?1`.
    fn build_memory_filter(query: &MemoryQuery) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut bindings: Vec<Box<dyn ToSql>> = Vec::new();

        bindings.push(Box::new(query.worker_name.clone()));
        clauses.push(format!("worker_name = ?{}", bindings.len()));

        bindings.push(Box::new(query.min_relevance));
        clauses.push(format!("relevance >= ?{}", bindings.len()));

        if let Some(kind) = query.kind {
            bindings.push(Box::new(kind.as_str().to_string()));
            clauses.push(format!("kind = ?{}", bindings.len()));
        }

        // Conjunctive tag filter: one LIKE per requested tag.
        for tag in &query.tags {
            bindings.push(Box::new(format!("%,{},%", escape_like_wildcards(tag))));
            clauses.push(format!("tags LIKE ?{} ESCAPE '\\'", bindings.len()));
        }

        (clauses.join(" AND "), bindings)
    }
}

impl MemoryBackend for SqliteStore {
    fn insert(&self, record: &MemoryRecord) -> Result<()> {
        let content =
            serde_json::to_string(&record.content).map_err(|e| op_err("encode_content", e))?;
        // Feedback-kind records carry their request id in the payload; it is
        // denormalized into a column for the idempotency count.
        let request_id = record
            .content
            .get("request_id")
            .and_then(serde_json::Value::as_str)
            .map(String::from);

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO memory_records
             (id, worker_name, kind, content, tags, request_id, relevance,
              created_at, last_accessed_at, access_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id.as_str(),
                record.worker_name,
                record.kind.as_str(),
                content,
                encode_tags(&record.tags),
                request_id,
                record.relevance,
                to_i64(record.created_at),
                to_i64(record.last_accessed_at),
                to_i64(record.access_count),
            ],
        )
        .map_err(|e| op_err("insert_memory", e))?;
        Ok(())
    }

    fn query(&self, query: &MemoryQuery) -> Result<Vec<MemoryRecord>> {
        let (filter, mut bindings) = Self::build_memory_filter(query);
        bindings.push(Box::new(to_i64(query.limit as u64)));
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_records
             WHERE {filter}
             ORDER BY relevance DESC, created_at DESC
             LIMIT ?{}",
            bindings.len()
        );

        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(&sql).map_err(|e| op_err("query_memory", e))?;
        let rows = stmt
            .query_map(
                params_from_iter(bindings.iter().map(|b| &**b)),
                |row| {
                    Ok(MemoryRow {
                        id: row.get(0)?,
                        worker_name: row.get(1)?,
                        kind: row.get(2)?,
                        content: row.get(3)?,
                        tags: row.get(4)?,
                        relevance: row.get(5)?,
                        created_at: row.get(6)?,
                        last_accessed_at: row.get(7)?,
                        access_count: row.get(8)?,
                    })
                },
            )
            .map_err(|e| op_err("query_memory", e))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(build_record_from_row(row.map_err(|e| op_err("query_memory", e))?));
        }
        Ok(records)
    }

    fn touch(&self, ids: &[RecordId], now: u64) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders: Vec<String> =
            (0..ids.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "UPDATE memory_records
             SET last_accessed_at = ?1, access_count = access_count + 1
             WHERE id IN ({})",
            placeholders.join(", ")
        );

        let mut bindings: Vec<Box<dyn ToSql>> = vec![Box::new(to_i64(now))];
        for id in ids {
            bindings.push(Box::new(id.as_str().to_string()));
        }

        let conn = acquire_lock(&self.conn);
        conn.execute(&sql, params_from_iter(bindings.iter().map(|b| &**b)))
            .map_err(|e| op_err("touch_memory", e))?;
        Ok(())
    }

    fn set_relevance(&self, id: &RecordId, relevance: f64) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE memory_records SET relevance = ?1 WHERE id = ?2",
            params![relevance, id.as_str()],
        )
        .map_err(|e| op_err("set_relevance", e))?;
        Ok(())
    }

    fn stale_counts(&self, cutoff_ts: u64, min_relevance: f64) -> Result<Vec<(MemoryKind, usize)>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT kind, COUNT(*) FROM memory_records
                 WHERE created_at < ?1 AND relevance < ?2
                 GROUP BY kind",
            )
            .map_err(|e| op_err("stale_counts", e))?;
        let rows = stmt
            .query_map(params![to_i64(cutoff_ts), min_relevance], |row| {
                let kind: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((MemoryKind::parse(&kind), to_u64(count) as usize))
            })
            .map_err(|e| op_err("stale_counts", e))?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row.map_err(|e| op_err("stale_counts", e))?);
        }
        Ok(counts)
    }

    fn delete_stale(&self, cutoff_ts: u64, min_relevance: f64) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let deleted = conn
            .execute(
                "DELETE FROM memory_records WHERE created_at < ?1 AND relevance < ?2",
                params![to_i64(cutoff_ts), min_relevance],
            )
            .map_err(|e| op_err("delete_stale", e))?;
        Ok(deleted)
    }

    fn list_decayable(&self, cutoff_ts: u64) -> Result<Vec<MemoryRecord>> {
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memory_records WHERE created_at >= ?1"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(&sql).map_err(|e| op_err("list_decayable", e))?;
        let rows = stmt
            .query_map(params![to_i64(cutoff_ts)], |row| {
                Ok(MemoryRow {
                    id: row.get(0)?,
                    worker_name: row.get(1)?,
                    kind: row.get(2)?,
                    content: row.get(3)?,
                    tags: row.get(4)?,
                    relevance: row.get(5)?,
                    created_at: row.get(6)?,
                    last_accessed_at: row.get(7)?,
                    access_count: row.get(8)?,
                })
            })
            .map_err(|e| op_err("list_decayable", e))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(build_record_from_row(row.map_err(|e| op_err("list_decayable", e))?));
        }
        Ok(records)
    }

    fn count_for_worker(&self, worker_name: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memory_records WHERE worker_name = ?1",
                params![worker_name],
                |row| row.get(0),
            )
            .map_err(|e| op_err("count_for_worker", e))?;
        Ok(to_u64(count) as usize)
    }

    fn feedback_record_count(&self, request_id: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memory_records
                 WHERE kind = 'feedback' AND request_id = ?1",
                params![request_id],
                |row| row.get(0),
            )
            .map_err(|e| op_err("feedback_record_count", e))?;
        Ok(to_u64(count) as usize)
    }
}

impl FeedbackBackend for SqliteStore {
    fn add_feedback(&self, item: &FeedbackItem) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO feedback
             (id, request_id, worker_name, rating, comment, processed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item.id,
                item.request_id,
                item.worker_name,
                i64::from(item.rating),
                item.comment,
                i64::from(item.processed),
                to_i64(item.created_at),
            ],
        )
        .map_err(|e| op_err("add_feedback", e))?;
        Ok(())
    }

    fn feedback_count_for_request(&self, request_id: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM feedback WHERE request_id = ?1",
                params![request_id],
                |row| row.get(0),
            )
            .map_err(|e| op_err("feedback_count", e))?;
        Ok(to_u64(count) as usize)
    }

    fn unprocessed_for_request(&self, request_id: &str) -> Result<Vec<FeedbackItem>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, request_id, worker_name, rating, comment, processed, created_at
                 FROM feedback
                 WHERE request_id = ?1 AND processed = 0
                 ORDER BY created_at ASC",
            )
            .map_err(|e| op_err("unprocessed_feedback", e))?;
        let rows = stmt
            .query_map(params![request_id], |row| {
                let rating: i64 = row.get(3)?;
                let processed: i64 = row.get(5)?;
                let created_at: i64 = row.get(6)?;
                Ok(FeedbackItem {
                    id: row.get(0)?,
                    request_id: row.get(1)?,
                    worker_name: row.get(2)?,
                    rating: u8::try_from(rating).unwrap_or(0),
                    comment: row.get(4)?,
                    processed: processed != 0,
                    created_at: to_u64(created_at),
                })
            })
            .map_err(|e| op_err("unprocessed_feedback", e))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(|e| op_err("unprocessed_feedback", e))?);
        }
        Ok(items)
    }

    fn mark_processed(&self, id: &str) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute("UPDATE feedback SET processed = 1 WHERE id = ?1", params![id])
            .map_err(|e| op_err("mark_processed", e))?;
        Ok(())
    }

    fn average_rating_for_worker(&self, worker_name: &str, since: u64) -> Result<Option<f64>> {
        let conn = acquire_lock(&self.conn);
        let avg: Option<f64> = conn
            .query_row(
                "SELECT AVG(rating) FROM feedback
                 WHERE worker_name = ?1 AND created_at >= ?2",
                params![worker_name, to_i64(since)],
                |row| row.get(0),
            )
            .map_err(|e| op_err("average_rating", e))?;
        Ok(avg)
    }
}

impl TaskBackend for SqliteStore {
    fn record_request(&self, request: &WorkRequest) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO requests (id, query, kind, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                request.id,
                request.query,
                request.kind,
                request.priority.as_str(),
                to_i64(request.created_at),
            ],
        )
        .map_err(|e| op_err("record_request", e))?;
        Ok(())
    }

    fn record_subtasks(&self, request_id: &str, subtasks: &[Subtask]) -> Result<()> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(|e| op_err("record_subtasks", e))?;
        for subtask in subtasks {
            tx.execute(
                "INSERT OR REPLACE INTO subtasks
                 (request_id, id, worker_name, description, depends_on, exec_order,
                  status, result, failure_reason, error, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    request_id,
                    subtask.id,
                    subtask.worker_name,
                    subtask.description,
                    encode_tags(&subtask.depends_on),
                    i64::from(subtask.order),
                    subtask.status.as_str(),
                    subtask
                        .result
                        .as_ref()
                        .map(serde_json::Value::to_string),
                    subtask.failure_reason.map(|r| r.as_str().to_string()),
                    subtask.error,
                    subtask.started_at.map(to_i64),
                    subtask.completed_at.map(to_i64),
                ],
            )
            .map_err(|e| op_err("record_subtasks", e))?;
        }
        tx.commit().map_err(|e| op_err("record_subtasks", e))?;
        Ok(())
    }

    fn update_subtask(&self, request_id: &str, subtask: &Subtask) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE subtasks
             SET status = ?3, result = ?4, failure_reason = ?5, error = ?6,
                 started_at = ?7, completed_at = ?8
             WHERE request_id = ?1 AND id = ?2",
            params![
                request_id,
                subtask.id,
                subtask.status.as_str(),
                subtask.result.as_ref().map(serde_json::Value::to_string),
                subtask.failure_reason.map(|r| r.as_str().to_string()),
                subtask.error,
                subtask.started_at.map(to_i64),
                subtask.completed_at.map(to_i64),
            ],
        )
        .map_err(|e| op_err("update_subtask", e))?;
        Ok(())
    }

    fn record_execution(
        &self,
        worker_name: &str,
        success: bool,
        duration_ms: u64,
        now: u64,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO worker_stats
             (worker_name, total_executions, successful_executions, total_duration_ms,
              last_execution_at)
             VALUES (?1, 1, ?2, ?3, ?4)
             ON CONFLICT(worker_name) DO UPDATE SET
                 total_executions = total_executions + 1,
                 successful_executions = successful_executions + excluded.successful_executions,
                 total_duration_ms = total_duration_ms + excluded.total_duration_ms,
                 last_execution_at = excluded.last_execution_at",
            params![
                worker_name,
                i64::from(success),
                to_i64(duration_ms),
                to_i64(now),
            ],
        )
        .map_err(|e| op_err("record_execution", e))?;
        Ok(())
    }

    fn worker_stats(&self, worker_name: &str) -> Result<Option<WorkerStats>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT worker_name, total_executions, successful_executions,
                    total_duration_ms, last_execution_at
             FROM worker_stats WHERE worker_name = ?1",
            params![worker_name],
            |row| {
                let total: i64 = row.get(1)?;
                let ok: i64 = row.get(2)?;
                let duration: i64 = row.get(3)?;
                let last: Option<i64> = row.get(4)?;
                Ok(WorkerStats {
                    worker_name: row.get(0)?,
                    total_executions: to_u64(total),
                    successful_executions: to_u64(ok),
                    total_duration_ms: to_u64(duration),
                    last_execution_at: last.map(to_u64),
                })
            },
        )
        .optional()
        .map_err(|e| op_err("worker_stats", e))
    }

    fn active_workers(&self, since: u64) -> Result<Vec<String>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT worker_name FROM worker_stats
                 WHERE last_execution_at >= ?1
                 ORDER BY worker_name",
            )
            .map_err(|e| op_err("active_workers", e))?;
        let rows = stmt
            .query_map(params![to_i64(since)], |row| row.get::<_, String>(0))
            .map_err(|e| op_err("active_workers", e))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row.map_err(|e| op_err("active_workers", e))?);
        }
        Ok(names)
    }

    fn requests_for_worker(&self, worker_name: &str, since: u64) -> Result<Vec<String>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT request_id FROM subtasks
                 WHERE worker_name = ?1 AND status = 'completed' AND completed_at >= ?2
                 ORDER BY request_id",
            )
            .map_err(|e| op_err("requests_for_worker", e))?;
        let rows = stmt
            .query_map(params![worker_name, to_i64(since)], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| op_err("requests_for_worker", e))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| op_err("requests_for_worker", e))?);
        }
        Ok(ids)
    }

    fn usage_counts(&self, since: u64) -> Result<Vec<WorkerUsage>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT worker_name,
                        COUNT(*),
                        SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                        AVG(CASE WHEN status = 'completed' AND started_at IS NOT NULL
                                 THEN (completed_at - started_at) * 1000.0 END)
                 FROM subtasks
                 WHERE started_at >= ?1 OR (started_at IS NULL AND completed_at >= ?1)
                 GROUP BY worker_name
                 ORDER BY worker_name",
            )
            .map_err(|e| op_err("usage_counts", e))?;
        let rows = stmt
            .query_map(params![to_i64(since)], |row| {
                let total: i64 = row.get(1)?;
                let completed: Option<i64> = row.get(2)?;
                let failed: Option<i64> = row.get(3)?;
                let avg: Option<f64> = row.get(4)?;
                Ok(WorkerUsage {
                    worker_name: row.get(0)?,
                    total_subtasks: to_u64(total),
                    completed: to_u64(completed.unwrap_or(0)),
                    failed: to_u64(failed.unwrap_or(0)),
                    avg_duration_ms: avg.unwrap_or(0.0),
                })
            })
            .map_err(|e| op_err("usage_counts", e))?;

        let mut usages = Vec::new();
        for row in rows {
            usages.push(row.map_err(|e| op_err("usage_counts", e))?);
        }
        Ok(usages)
    }
}
