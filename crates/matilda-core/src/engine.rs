//! SQLite query engine.
//!
//! The discovery core only ever *reads*: the connection is opened read-only
//! and the engine exposes three counting/sampling operations behind the
//! [`QueryEngine`] trait. A progress handler gives every statement a hard
//! bound: it aborts when the global cancel flag is set or the per-statement
//! deadline passes, and the abort surfaces as `QueryError{Timeout}`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::{Connection, OpenFlags};

use crate::error::{QueryError, QueryErrorKind};

pub type SqlValue = rusqlite::types::Value;

pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// How many VM ops run between progress-handler callbacks.
const PROGRESS_OPS: std::os::raw::c_int = 1000;

/// The three operations the discovery core needs from a database.
pub trait QueryEngine {
    /// Execute a `SELECT COUNT(*) …` statement.
    fn count(&self, sql: &str, params: &[SqlValue]) -> Result<u64, QueryError>;

    /// Count distinct tuples of `exprs` over a `FROM … [WHERE …]` suffix.
    fn count_distinct(
        &self,
        exprs: &[String],
        from_where: &str,
        params: &[SqlValue],
    ) -> Result<u64, QueryError>;

    /// Up to `limit` distinct non-NULL values of a column, as opaque stable
    /// hashes in a deterministic order.
    fn sample_values(
        &self,
        relation: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<u64>, QueryError>;
}

pub struct SqliteEngine {
    conn: Connection,
    cancel: Arc<AtomicBool>,
    /// Millis since `origin` after which the progress handler aborts the
    /// running statement; `u64::MAX` disarms it.
    deadline: Arc<AtomicU64>,
    origin: Instant,
    statement_timeout: Duration,
}

impl SqliteEngine {
    /// Open a database read-only with no cancellation wired up.
    pub fn open(path: &Path) -> Result<Self, QueryError> {
        Self::open_with(path, Arc::new(AtomicBool::new(false)), DEFAULT_STATEMENT_TIMEOUT)
    }

    /// Open a database read-only, aborting statements when `cancel` is set
    /// or `statement_timeout` elapses mid-statement.
    pub fn open_with(
        path: &Path,
        cancel: Arc<AtomicBool>,
        statement_timeout: Duration,
    ) -> Result<Self, QueryError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            QueryError::new(
                QueryErrorKind::Driver,
                format!("cannot open `{}`: {e}", path.display()),
                "",
            )
        })?;

        let origin = Instant::now();
        let deadline = Arc::new(AtomicU64::new(u64::MAX));
        {
            let cancel = Arc::clone(&cancel);
            let deadline = Arc::clone(&deadline);
            conn.progress_handler(
                PROGRESS_OPS,
                Some(move || {
                    cancel.load(Ordering::Relaxed)
                        || origin.elapsed().as_millis() as u64 >= deadline.load(Ordering::Relaxed)
                }),
            );
        }

        Ok(Self {
            conn,
            cancel,
            deadline,
            origin,
            statement_timeout,
        })
    }

    // ------------------------------------------------------------------
    // Introspection (used by the catalog, outside the QueryEngine trait)
    // ------------------------------------------------------------------

    /// Names of all base tables, sorted. SQLite internals are skipped.
    pub fn list_tables(&self) -> Result<Vec<String>, QueryError> {
        let sql = "SELECT name FROM sqlite_master \
                   WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| self.map_error(e, sql))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| self.map_error(e, sql))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| self.map_error(e, sql))
    }

    /// `(column name, declared type)` pairs in declaration order.
    pub fn table_columns(&self, table: &str) -> Result<Vec<(String, String)>, QueryError> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| self.map_error(e, &sql))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(|e| self.map_error(e, &sql))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| self.map_error(e, &sql))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn guard_dispatch(&self, sql: &str) -> Result<(), QueryError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(QueryError::new(
                QueryErrorKind::Timeout,
                "cancelled before dispatch",
                sql,
            ));
        }
        let deadline = self.origin.elapsed() + self.statement_timeout;
        self.deadline
            .store(deadline.as_millis() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn disarm(&self) {
        self.deadline.store(u64::MAX, Ordering::Relaxed);
    }

    fn run_count(&self, sql: &str, params: &[SqlValue]) -> Result<u64, QueryError> {
        self.guard_dispatch(sql)?;
        let result = self.conn.query_row(
            sql,
            rusqlite::params_from_iter(params.iter()),
            |row| row.get::<_, i64>(0),
        );
        self.disarm();
        match result {
            Ok(n) => Ok(n.max(0) as u64),
            Err(e) => Err(self.map_error(e, sql)),
        }
    }

    fn map_error(&self, err: rusqlite::Error, sql: &str) -> QueryError {
        let kind = match &err {
            rusqlite::Error::SqliteFailure(inner, message) => {
                if inner.code == rusqlite::ErrorCode::OperationInterrupted {
                    QueryErrorKind::Timeout
                } else if message
                    .as_deref()
                    .is_some_and(|m| m.starts_with("no such table") || m.starts_with("no such column"))
                {
                    QueryErrorKind::Schema
                } else {
                    QueryErrorKind::Driver
                }
            }
            _ => QueryErrorKind::Driver,
        };
        QueryError::new(kind, err.to_string(), sql)
    }
}

impl QueryEngine for SqliteEngine {
    fn count(&self, sql: &str, params: &[SqlValue]) -> Result<u64, QueryError> {
        self.run_count(sql, params)
    }

    fn count_distinct(
        &self,
        exprs: &[String],
        from_where: &str,
        params: &[SqlValue],
    ) -> Result<u64, QueryError> {
        // SQLite rejects multi-expression COUNT(DISTINCT a, b); the subquery
        // form is accepted by SQLite, MySQL, and PostgreSQL alike.
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT DISTINCT {} {})",
            exprs.join(", "),
            from_where
        );
        self.run_count(&sql, params)
    }

    fn sample_values(
        &self,
        relation: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<u64>, QueryError> {
        // Values are hashed in their text form so INTEGER 3 and TEXT '3'
        // land on the same hash, matching how the equi-join would compare
        // them. The ORDER BY keeps the sample deterministic across runs.
        let sql = format!(
            "SELECT DISTINCT CAST({col} AS TEXT) AS v FROM {rel} \
             WHERE {col} IS NOT NULL ORDER BY v LIMIT {limit}",
            col = quote_ident(column),
            rel = quote_ident(relation),
        );
        self.guard_dispatch(&sql)?;
        let result = (|| -> rusqlite::Result<Vec<u64>> {
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut hashes = Vec::new();
            for row in rows {
                hashes.push(fnv1a64(row?.as_bytes()));
            }
            Ok(hashes)
        })();
        self.disarm();
        result.map_err(|e| self.map_error(e, &sql))
    }
}

/// Double-quote an identifier for SQL, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// FNV-1a, 64-bit. Used for value-overlap estimation; unlike the std
/// hasher it is stable across processes and platforms, which the
/// reproducibility contract requires.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x1_0000_0000_01b3);
    }
    hash
}
