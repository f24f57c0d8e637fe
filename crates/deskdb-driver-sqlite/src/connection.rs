//! SQLite connection implementation

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, ErrorCode, OpenFlags, params_from_iter};
use std::sync::Arc;
use std::time::Instant;
use deskdb_core::{
    ColumnMeta, Connection, DeskError, QueryResult, Result, Row, StatementResult, Transaction,
    Value,
};

use crate::SqliteConfig;

type SharedHandle = Arc<Mutex<Option<RusqliteConnection>>>;

/// SQLite connection wrapper
///
/// The rusqlite handle sits behind an `Option` so that `close()` can release
/// the file handle while other clones of the `Arc` are still alive.
pub struct SqliteConnection {
    conn: SharedHandle,
}

impl SqliteConnection {
    /// Open a database and apply the configured tuning pragmas
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        tracing::debug!(path = %config.path, "opening SQLite database");

        let conn = if config.is_memory() {
            RusqliteConnection::open_in_memory()
                .map_err(|e| classify_error("Failed to open in-memory database", e))?
        } else {
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            RusqliteConnection::open_with_flags(&config.path, flags).map_err(|e| {
                DeskError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    config.path, e
                ))
            })?
        };

        apply_pragmas(&conn, config)?;

        tracing::debug!(path = %config.path, "SQLite connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&RusqliteConnection) -> Result<T>) -> Result<T> {
        with_handle(&self.conn, f)
    }
}

fn apply_pragmas(conn: &RusqliteConnection, config: &SqliteConfig) -> Result<()> {
    let pragma_err = |name: &str, e: rusqlite::Error| {
        DeskError::Connection(format!("Failed to apply PRAGMA {}: {}", name, e))
    };

    conn.busy_timeout(config.busy_timeout())
        .map_err(|e| pragma_err("busy_timeout", e))?;

    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.pragma_update(None, "foreign_keys", foreign_keys)
        .map_err(|e| pragma_err("foreign_keys", e))?;

    // journal_mode answers with the mode actually in effect (memory databases ignore WAL)
    let journal_mode: String = conn
        .pragma_update_and_check(None, "journal_mode", config.journal_mode.as_str(), |row| {
            row.get(0)
        })
        .map_err(|e| pragma_err("journal_mode", e))?;

    conn.pragma_update(None, "synchronous", config.synchronous.as_str())
        .map_err(|e| pragma_err("synchronous", e))?;

    if let Some(cache_size) = config.cache_size {
        conn.pragma_update(None, "cache_size", cache_size)
            .map_err(|e| pragma_err("cache_size", e))?;
    }

    tracing::trace!(journal_mode = %journal_mode, foreign_keys, "SQLite pragmas applied");
    Ok(())
}

fn with_handle<T>(
    handle: &Mutex<Option<RusqliteConnection>>,
    f: impl FnOnce(&RusqliteConnection) -> Result<T>,
) -> Result<T> {
    let guard = handle.lock();
    let conn = guard
        .as_ref()
        .ok_or_else(|| DeskError::Connection("SQLite connection is closed".into()))?;
    f(conn)
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.with_conn(|conn| run_execute(conn, sql, params))
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.with_conn(|conn| run_query(conn, sql, params))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.with_conn(|conn| {
            // IMMEDIATE takes the write lock up front so a busy database fails
            // here, before any statement of the transaction has run.
            conn.execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| classify_error("Failed to begin transaction", e))
        })?;
        tracing::trace!("SQLite transaction started");
        Ok(Box::new(SqliteTransaction {
            conn: Arc::clone(&self.conn),
            finished: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn
            && let Err((_, e)) = conn.close()
        {
            tracing::warn!(error = %e, "SQLite connection did not close cleanly");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

/// SQLite transaction wrapper.
///
/// Issues raw `BEGIN` / `COMMIT` / `ROLLBACK` so it can share the connection
/// handle without rusqlite's borrow-scoped transaction type.
pub struct SqliteTransaction {
    conn: SharedHandle,
    finished: bool,
}

impl SqliteTransaction {
    fn finish(&mut self, statement: &str) -> Result<()> {
        self.finished = true;
        with_handle(&self.conn, |conn| {
            conn.execute_batch(statement)
                .map_err(|e| classify_error(&format!("Failed to {}", statement), e))
        })
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("SQLite transaction dropped without commit or rollback, rolling back");
        let guard = self.conn.lock();
        if let Some(conn) = guard.as_ref()
            && let Err(e) = conn.execute_batch("ROLLBACK")
        {
            tracing::error!(error = %e, "automatic rollback on drop failed");
        }
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish("COMMIT")
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        with_handle(&self.conn, |conn| run_query(conn, sql, params))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        with_handle(&self.conn, |conn| run_execute(conn, sql, params))
    }
}

fn run_execute(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<StatementResult> {
    let bound = values_to_rusqlite(params);
    let affected = conn
        .execute(sql, params_from_iter(bound.iter()))
        .map_err(|e| classify_error("Failed to execute statement", e))?;

    let last_insert_id = (affected > 0 && is_insert(sql)).then(|| conn.last_insert_rowid());

    tracing::trace!(affected_rows = affected, "statement executed");
    Ok(StatementResult {
        affected_rows: affected as u64,
        last_insert_id,
    })
}

fn run_query(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start = Instant::now();
    let bound = values_to_rusqlite(params);

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| classify_error("Failed to prepare query", e))?;

    let columns: Vec<ColumnMeta> = stmt
        .columns()
        .iter()
        .enumerate()
        .map(|(ordinal, col)| ColumnMeta {
            name: col.name().to_string(),
            data_type: col.decl_type().map(str::to_string),
            ordinal,
        })
        .collect();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let mut rows = Vec::new();
    let mut cursor = stmt
        .query(params_from_iter(bound.iter()))
        .map_err(|e| classify_error("Failed to execute query", e))?;

    while let Some(row) = cursor
        .next()
        .map_err(|e| classify_error("Failed to fetch row", e))?
    {
        let values = (0..column_names.len())
            .map(|idx| rusqlite_to_value(row, idx))
            .collect::<Result<Vec<_>>>()?;
        rows.push(Row::new(column_names.clone(), values));
    }

    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms: start.elapsed().as_millis() as u64,
    })
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start();
    ["INSERT", "REPLACE"].iter().any(|kw| {
        head.get(..kw.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kw))
    })
}

/// Map a rusqlite failure onto the retry-aware error taxonomy
fn classify_error(context: &str, err: rusqlite::Error) -> DeskError {
    let message = format!("{}: {}", context, err);
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => DeskError::Constraint(message),
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::OperationInterrupted
            | ErrorCode::SchemaChanged => DeskError::TransientQuery(message),
            ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::FileLockingProtocolFailed => DeskError::Connection(message),
            ErrorCode::TypeMismatch | ErrorCode::TooBig | ErrorCode::ParameterOutOfRange => {
                DeskError::Validation(message)
            }
            _ => DeskError::Query(message),
        },
        rusqlite::Error::InvalidParameterCount(..)
        | rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::ToSqlConversionFailure(_) => DeskError::Validation(message),
        _ => DeskError::Query(message),
    }
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Integer(i) => Sql::Integer(*i),
        Value::Real(f) => Sql::Real(*f),
        Value::Text(s) => Sql::Text(s.clone()),
        Value::Blob(b) => Sql::Blob(b.clone()),
        Value::Uuid(u) => Sql::Text(u.to_string()),
        Value::Timestamp(ts) => Sql::Text(ts.to_rfc3339()),
        Value::Json(j) => Sql::Text(j.to_string()),
    }
}

fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| classify_error("Failed to read column", e))?;

    Ok(match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}
