//! Connection seams.
//!
//! Drivers implement [`Connection`] and [`Transaction`]. Both receive statements that
//! already went through [`Dialect::prepare`](crate::dialect::Dialect::prepare), so the
//! SQL uses the engine's native placeholders.

use crate::dialect::Dialect;
use crate::error::OrmResult;
use crate::monitor::{MonitorSettings, QueryContext, QueryResult};
use crate::row::Row;
use crate::transaction::Tx;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Auto-generated key, when the engine reports one for the statement.
    pub last_insert_id: Option<i64>,
}

/// A pooled database handle for one logical connection name.
///
/// `query` treats an execution failure after a successful prepare as an
/// infrastructure fault and panics; prepare/parse failures are returned as errors.
#[async_trait]
pub trait Connection: Send + Sync {
    fn dialect(&self) -> &'static dyn Dialect;

    async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>>;

    async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<ExecResult>;

    /// Check out one handle and run `statements` (from
    /// [`Dialect::begin`](crate::dialect::Dialect::begin)) on it.
    async fn begin(&self, statements: &[String]) -> OrmResult<Box<dyn Transaction>>;
}

/// A transaction pinned to a single connection handle.
///
/// After `commit` or `rollback` every further call fails with
/// [`OrmError::TransactionFinished`](crate::OrmError::TransactionFinished).
#[async_trait]
pub trait Transaction: Send {
    async fn query(&mut self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>>;

    async fn execute(&mut self, sql: &str, args: &[Value]) -> OrmResult<ExecResult>;

    async fn commit(&mut self) -> OrmResult<()>;

    async fn rollback(&mut self) -> OrmResult<()>;
}

/// Where a statement runs: a pooled connection or an open transaction.
#[derive(Clone)]
pub(crate) enum Target {
    Connection {
        name: String,
        conn: Arc<dyn Connection>,
    },
    Transaction(Tx),
}

impl Target {
    pub(crate) fn dialect(&self) -> &'static dyn Dialect {
        match self {
            Target::Connection { conn, .. } => conn.dialect(),
            Target::Transaction(tx) => tx.dialect(),
        }
    }

    pub(crate) fn in_transaction(&self) -> bool {
        matches!(self, Target::Transaction(_))
    }

    fn context(&self, sql: &str, args: &[Value]) -> QueryContext {
        let name = match self {
            Target::Connection { name, .. } => name.as_str(),
            Target::Transaction(tx) => tx.connection_name(),
        };
        QueryContext::new(sql, args.len(), self.dialect().kind())
            .with_connection(name)
            .in_transaction(self.in_transaction())
    }

    /// Prepare `sql` (rendered with `?` placeholders) for the dialect and fetch rows.
    pub(crate) async fn query(
        &self,
        sql: &str,
        args: &[Value],
        monitor: &MonitorSettings,
    ) -> OrmResult<Vec<Row>> {
        let prepared = self.dialect().prepare(sql);
        let ctx = self.context(&prepared, args);
        let start = Instant::now();
        let result = match self {
            Target::Connection { conn, .. } => conn.query(&prepared, args).await,
            Target::Transaction(tx) => tx.query_prepared(&prepared, args).await,
        };
        let outcome = match &result {
            Ok(rows) => QueryResult::Rows(rows.len()),
            Err(e) => QueryResult::error(e.to_string()),
        };
        monitor.observe(&ctx, start.elapsed(), &outcome);
        result
    }

    /// Prepare `sql` for the dialect and execute it.
    pub(crate) async fn execute(
        &self,
        sql: &str,
        args: &[Value],
        monitor: &MonitorSettings,
    ) -> OrmResult<ExecResult> {
        let prepared = self.dialect().prepare(sql);
        let ctx = self.context(&prepared, args);
        let start = Instant::now();
        let result = match self {
            Target::Connection { conn, .. } => conn.execute(&prepared, args).await,
            Target::Transaction(tx) => tx.execute_prepared(&prepared, args).await,
        };
        let outcome = match &result {
            Ok(done) => QueryResult::Affected(done.rows_affected),
            Err(e) => QueryResult::error(e.to_string()),
        };
        monitor.observe(&ctx, start.elapsed(), &outcome);
        result
    }
}
