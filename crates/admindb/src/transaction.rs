//! Transactions with isolation levels and fault-safe disposition.
//!
//! [`run`] opens a transaction, hands a [`Tx`] handle to the caller's closure and then:
//!
//! - the closure panics: roll back, then resume the panic;
//! - the closure returns `Err`: roll back, then return that error;
//! - the closure returns `Ok`: commit.
//!
//! ```ignore
//! let id = db
//!     .with_transaction(|tx| {
//!         let db = db.clone();
//!         async move {
//!             let id = db.table("orders").with_tx(&tx).insert(values! { "total" => 10 }).await?;
//!             db.table("stock")
//!                 .with_tx(&tx)
//!                 .where_eq("sku", "a1")
//!                 .update_raw("qty = qty - ?", vec![1.into()])
//!                 .exec()
//!                 .await?;
//!             Ok(id)
//!         }
//!     })
//!     .await?;
//! ```

use crate::connection::{Connection, ExecResult, Transaction};
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::monitor::SQL_TARGET;
use crate::row::Row;
use crate::value::Value;
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionIsolation {
    /// Whatever the connection is configured with
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    /// SQL Server only
    Snapshot,
    Serializable,
}

impl fmt::Display for TransactionIsolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionIsolation::Default => "DEFAULT",
            TransactionIsolation::ReadUncommitted => "READ UNCOMMITTED",
            TransactionIsolation::ReadCommitted => "READ COMMITTED",
            TransactionIsolation::RepeatableRead => "REPEATABLE READ",
            TransactionIsolation::Snapshot => "SNAPSHOT",
            TransactionIsolation::Serializable => "SERIALIZABLE",
        })
    }
}

/// Handle to an open transaction. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Tx {
    inner: Arc<Mutex<Option<Box<dyn Transaction>>>>,
    dialect: &'static dyn Dialect,
    connection: Arc<str>,
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("dialect", &self.dialect.kind())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl Tx {
    pub(crate) fn new(
        handle: Box<dyn Transaction>,
        dialect: &'static dyn Dialect,
        connection: &str,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(handle))),
            dialect,
            connection: Arc::from(connection),
        }
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub fn connection_name(&self) -> &str {
        &self.connection
    }

    /// Whether commit or rollback already happened.
    pub async fn is_finished(&self) -> bool {
        self.inner.lock().await.is_none()
    }

    pub(crate) async fn query_prepared(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(OrmError::TransactionFinished)?;
        tx.query(sql, args).await
    }

    pub(crate) async fn execute_prepared(
        &self,
        sql: &str,
        args: &[Value],
    ) -> OrmResult<ExecResult> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(OrmError::TransactionFinished)?;
        tx.execute(sql, args).await
    }

    pub(crate) async fn commit(&self) -> OrmResult<()> {
        let mut handle = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(OrmError::TransactionFinished)?;
        handle.commit().await
    }

    pub(crate) async fn rollback(&self) -> OrmResult<()> {
        let mut handle = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(OrmError::TransactionFinished)?;
        handle.rollback().await
    }
}

/// Run `f` inside a transaction on `conn` at isolation `level`.
pub async fn run<F, Fut, T>(
    conn: &Arc<dyn Connection>,
    connection: &str,
    level: TransactionIsolation,
    f: F,
) -> OrmResult<T>
where
    F: FnOnce(Tx) -> Fut,
    Fut: Future<Output = OrmResult<T>>,
{
    let dialect = conn.dialect();
    let statements = dialect.begin(level)?;
    let handle = conn.begin(&statements).await?;
    let tx = Tx::new(handle, dialect, connection);

    let body = tx.clone();
    let outcome = AssertUnwindSafe(async move { f(body).await })
        .catch_unwind()
        .await;

    match outcome {
        Err(panic) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(
                    target: SQL_TARGET,
                    connection,
                    error = %rollback_err,
                    "rollback after panic failed"
                );
            }
            std::panic::resume_unwind(panic)
        }
        Ok(Err(error)) => match tx.rollback().await {
            Ok(()) => Err(error),
            Err(rollback_err) => {
                tracing::warn!(
                    target: SQL_TARGET,
                    connection,
                    error = %rollback_err,
                    "rollback failed"
                );
                Err(OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                )))
            }
        },
        Ok(Ok(value)) => {
            tx.commit().await?;
            Ok(value)
        }
    }
}
