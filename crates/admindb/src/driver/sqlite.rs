//! SQLite driver over a single `rusqlite` handle.
//!
//! Statements are serialized on one connection. A transaction holds the handle until it
//! commits or rolls back, so work issued outside it through the same connection waits, at
//! most `wait_timeout_ms` (30s when unset), then fails with [`OrmError::Pool`].

use crate::config::DatabaseConfig;
use crate::connection::{Connection, ExecResult, Transaction};
use crate::dialect::{Dialect, DialectKind};
use crate::error::{OrmError, OrmResult};
use crate::monitor::{QueryKind, SQL_TARGET};
use crate::row::Row;
use crate::types::{ColumnClass, ScanTarget};
use crate::value::Value;
use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

const MEMORY: &str = ":memory:";
const DEFAULT_WAIT: Duration = Duration::from_secs(30);

/// Shared SQLite connection.
#[derive(Clone)]
pub struct SqliteConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
    /// Set while a transaction holds `conn`
    in_tx: Arc<AtomicBool>,
    wait_timeout: Duration,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open `config.file` (or the DSN), creating it if needed.
    pub fn open(config: &DatabaseConfig) -> OrmResult<Self> {
        let path = config.dsn()?;
        let conn = if path == MEMORY {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| OrmError::Connection(format!("failed to open sqlite database {path}: {e}")))?;
        let wait = config.wait_timeout_ms.map_or(DEFAULT_WAIT, Duration::from_millis);
        Ok(Self::from_connection(conn).with_wait_timeout(wait))
    }

    pub fn in_memory() -> OrmResult<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            in_tx: Arc::new(AtomicBool::new(false)),
            wait_timeout: DEFAULT_WAIT,
        }
    }

    /// How long a statement waits for the connection before failing.
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    async fn lock(&self) -> OrmResult<MutexGuard<'_, rusqlite::Connection>> {
        if let Ok(conn) = self.conn.try_lock() {
            return Ok(conn);
        }
        self.warn_if_in_transaction();
        tokio::time::timeout(self.wait_timeout, self.conn.lock())
            .await
            .map_err(|_| self.busy())
    }

    fn warn_if_in_transaction(&self) {
        if self.in_tx.load(Ordering::Acquire) {
            tracing::warn!(
                target: SQL_TARGET,
                "statement waits for an open transaction on the same connection; \
                 run it inside with `.with_tx(&tx)`"
            );
        }
    }

    fn busy(&self) -> OrmError {
        OrmError::Pool(format!(
            "sqlite connection still busy after {:?}",
            self.wait_timeout
        ))
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn dialect(&self) -> &'static dyn Dialect {
        DialectKind::Sqlite.dialect()
    }

    async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        let conn = self.lock().await?;
        fetch(&conn, sql, args)
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        let conn = self.lock().await?;
        execute(&conn, sql, args)
    }

    async fn begin(&self, statements: &[String]) -> OrmResult<Box<dyn Transaction>> {
        let conn = match Arc::clone(&self.conn).try_lock_owned() {
            Ok(conn) => conn,
            Err(_) => {
                self.warn_if_in_transaction();
                tokio::time::timeout(self.wait_timeout, Arc::clone(&self.conn).lock_owned())
                    .await
                    .map_err(|_| self.busy())?
            }
        };
        for statement in statements {
            conn.execute_batch(statement)
                .map_err(OrmError::from_sqlite_error)?;
        }
        self.in_tx.store(true, Ordering::Release);
        Ok(Box::new(SqliteTransaction {
            conn: Some(conn),
            in_tx: Arc::clone(&self.in_tx),
        }))
    }
}

/// Transaction holding the connection lock.
pub struct SqliteTransaction {
    conn: Option<OwnedMutexGuard<rusqlite::Connection>>,
    in_tx: Arc<AtomicBool>,
}

impl SqliteTransaction {
    fn conn(&self) -> OrmResult<&rusqlite::Connection> {
        self.conn.as_deref().ok_or(OrmError::TransactionFinished)
    }

    fn finish(&mut self, statement: &str) -> OrmResult<()> {
        let conn = self.conn.take().ok_or(OrmError::TransactionFinished)?;
        let done = conn
            .execute_batch(statement)
            .map_err(OrmError::from_sqlite_error);
        self.in_tx.store(false, Ordering::Release);
        done
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn query(&mut self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        fetch(self.conn()?, sql, args)
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        execute(self.conn()?, sql, args)
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.finish("COMMIT")
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(target: SQL_TARGET, "transaction dropped while open, rolling back");
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(target: SQL_TARGET, error = %e, "rollback of dropped transaction failed");
            }
            self.in_tx.store(false, Ordering::Release);
        }
    }
}

fn fetch(conn: &rusqlite::Connection, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(OrmError::from_sqlite_error)?;
    let columns: Vec<(String, ColumnClass)> = stmt
        .columns()
        .iter()
        .map(|c| {
            let class = c.decl_type().map_or(ColumnClass::Dynamic, ColumnClass::of);
            (c.name().to_string(), class)
        })
        .collect();
    let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();

    let mut rows = stmt
        .query(rusqlite::params_from_iter(args.iter()))
        .map_err(OrmError::from_sqlite_error)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(OrmError::from_sqlite_error)? {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, (name, class)) in columns.iter().enumerate() {
            let cell = row.get_ref(idx).map_err(OrmError::from_sqlite_error)?;
            let target = scan(cell, *class).map_err(|message| OrmError::decode(name, message))?;
            values.push(target.into_value());
        }
        out.push(Row::new(names.clone(), values));
    }
    Ok(out)
}

fn execute(conn: &rusqlite::Connection, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(OrmError::from_sqlite_error)?;
    let rows_affected = stmt
        .execute(rusqlite::params_from_iter(args.iter()))
        .map_err(OrmError::from_sqlite_error)?;
    let last_insert_id = match QueryKind::from_sql(sql) {
        QueryKind::Insert => Some(conn.last_insert_rowid()),
        _ => None,
    };
    Ok(ExecResult {
        rows_affected: rows_affected as u64,
        last_insert_id,
    })
}

/// Read one cell into the target for its declared class. SQLite stores any value in any
/// column, so numeric text is accepted for numeric classes.
fn scan(cell: ValueRef<'_>, class: ColumnClass) -> Result<ScanTarget, String> {
    if let ValueRef::Null = cell {
        return Ok(ScanTarget::empty(class));
    }
    let target = match class {
        ColumnClass::Bool => ScanTarget::Bool(Some(match cell {
            ValueRef::Integer(i) => i != 0,
            ValueRef::Real(f) => f != 0.0,
            other => match text(other).to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => true,
                "0" | "f" | "false" => false,
                s => return Err(format!("expected boolean, found `{s}`")),
            },
        })),
        ColumnClass::Int => ScanTarget::Int(Some(match cell {
            ValueRef::Integer(i) => i,
            ValueRef::Real(f) => f as i64,
            other => {
                let s = text(other);
                s.trim()
                    .parse()
                    .map_err(|_| format!("expected integer, found `{s}`"))?
            }
        })),
        ColumnClass::Float => ScanTarget::Float(Some(match cell {
            ValueRef::Integer(i) => i as f64,
            ValueRef::Real(f) => f,
            other => {
                let s = text(other);
                s.trim()
                    .parse()
                    .map_err(|_| format!("expected number, found `{s}`"))?
            }
        })),
        ColumnClass::Unsigned => ScanTarget::Unsigned(Some(match cell {
            ValueRef::Blob(b) => b.to_vec(),
            other => text(other).into_bytes(),
        })),
        ColumnClass::Text => ScanTarget::Text(Some(text(cell))),
        ColumnClass::Dynamic => ScanTarget::Dynamic(match cell {
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
            ValueRef::Null => Value::Null,
        }),
    };
    Ok(target)
}

fn text(cell: ValueRef<'_>) -> String {
    match cell {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}
