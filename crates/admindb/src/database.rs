//! Connection registry.
//!
//! A [`Database`] is built once at startup and cloned into whatever needs it. It maps
//! connection names to [`Connection`]s, owns the statement free-list shared by all
//! builders, and carries the builder [`Settings`].
//!
//! ```ignore
//! let list = DatabaseList::from_file("config/database.toml")?;
//! let db = Database::connect(&list).await?;
//!
//! let user = db.table("goadmin_users").find(1).await?;
//! ```

use crate::builder::{Sql, StatementPool};
use crate::config::DatabaseList;
use crate::connection::{Connection, ExecResult, Target};
use crate::dialect::{Dialect, DialectKind};
use crate::error::{OrmError, OrmResult};
use crate::monitor::MonitorSettings;
use crate::row::Row;
use crate::transaction::{self, TransactionIsolation, Tx};
use crate::value::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Name of the connection `table`, `query` and `with_transaction` use.
pub const DEFAULT_CONNECTION: &str = "default";

/// Tables whose PostgreSQL inserts recover the new key through `RETURNING id`.
pub const DEFAULT_RETURNING_ID_TABLES: [&str; 4] = [
    "goadmin_menu",
    "goadmin_permissions",
    "goadmin_roles",
    "goadmin_users",
];

/// Builder behavior shared by a registry.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Substring allow-list for `INSERT ... RETURNING id` on PostgreSQL.
    pub returning_id_tables: Vec<String>,
    pub monitor: MonitorSettings,
    /// Idle statement components kept for reuse.
    pub statement_pool_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            returning_id_tables: DEFAULT_RETURNING_ID_TABLES
                .iter()
                .map(|t| t.to_string())
                .collect(),
            monitor: MonitorSettings::default(),
            statement_pool_size: 64,
        }
    }
}

impl Settings {
    pub(crate) fn returns_id(&self, table: &str) -> bool {
        self.returning_id_tables
            .iter()
            .any(|t| table.contains(t.as_str()))
    }
}

struct Registry {
    connections: HashMap<String, Arc<dyn Connection>>,
    pool: Arc<StatementPool>,
    settings: Arc<Settings>,
}

/// Named connections plus builder settings. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Registry>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.inner.connections.keys().collect();
        names.sort();
        f.debug_struct("Database")
            .field("connections", &names)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

/// Collects connections and settings for a [`Database`].
#[derive(Default)]
pub struct DatabaseBuilder {
    connections: HashMap<String, Arc<dyn Connection>>,
    settings: Settings,
}

impl DatabaseBuilder {
    pub fn connection(mut self, name: impl Into<String>, conn: Arc<dyn Connection>) -> Self {
        self.connections.insert(name.into(), conn);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn monitor(mut self, monitor: MonitorSettings) -> Self {
        self.settings.monitor = monitor;
        self
    }

    pub fn returning_id_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.returning_id_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Database {
        Database {
            inner: Arc::new(Registry {
                connections: self.connections,
                pool: Arc::new(StatementPool::new(self.settings.statement_pool_size)),
                settings: Arc::new(self.settings),
            }),
        }
    }
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// Open every configured connection.
    ///
    /// PostgreSQL and SQLite are opened with the bundled drivers. MySQL and SQL Server
    /// connections must be registered through [`DatabaseBuilder::connection`].
    pub async fn connect(list: &DatabaseList) -> OrmResult<Self> {
        list.validate()?;
        let mut builder = Self::builder();
        let mut slow: Option<Duration> = None;

        for (name, config) in list.iter() {
            let kind = config.dialect()?;
            let conn: Arc<dyn Connection> = match kind {
                #[cfg(feature = "postgres")]
                DialectKind::Postgresql => {
                    Arc::new(crate::driver::postgres::PgConnection::connect(config)?)
                }
                #[cfg(feature = "sqlite")]
                DialectKind::Sqlite => Arc::new(crate::driver::sqlite::SqliteConnection::open(config)?),
                other => {
                    return Err(OrmError::Connection(format!(
                        "no bundled driver for {other} (connection `{name}`); register one with Database::builder()"
                    )));
                }
            };
            if let Some(ms) = config.slow_query_ms {
                let threshold = Duration::from_millis(ms);
                slow = Some(slow.map_or(threshold, |s| s.min(threshold)));
            }
            tracing::info!(
                target: crate::monitor::SQL_TARGET,
                connection = %name,
                dialect = %kind,
                "connection registered"
            );
            builder = builder.connection(name.clone(), conn);
        }

        if let Some(threshold) = slow {
            let monitor = builder.settings.monitor.clone();
            builder = builder.monitor(monitor.with_slow_query_threshold(threshold));
        }
        Ok(builder.build())
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn statement_pool(&self) -> &Arc<StatementPool> {
        &self.inner.pool
    }

    pub fn connection(&self, name: &str) -> OrmResult<Arc<dyn Connection>> {
        self.inner
            .connections
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::Connection(format!("unknown connection `{name}`")))
    }

    pub fn dialect(&self, name: &str) -> OrmResult<&'static dyn Dialect> {
        Ok(self.connection(name)?.dialect())
    }

    fn target(&self, name: &str) -> OrmResult<Target> {
        Ok(Target::Connection {
            name: name.to_string(),
            conn: self.connection(name)?,
        })
    }

    /// Builder for `table` on the default connection.
    ///
    /// # Panics
    ///
    /// Panics when no `default` connection is registered.
    pub fn table(&self, table: &str) -> Sql {
        match self.table_on(DEFAULT_CONNECTION, table) {
            Ok(sql) => sql,
            Err(err) => crate::fault(err),
        }
    }

    /// Builder for `table` on the named connection.
    pub fn table_on(&self, connection: &str, table: &str) -> OrmResult<Sql> {
        Ok(Sql::new(
            &self.inner.pool,
            self.target(connection)?,
            Arc::clone(&self.inner.settings),
            table,
        ))
    }

    /// Raw statement on the default connection; `?` placeholders.
    pub async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        self.query_on(DEFAULT_CONNECTION, sql, args).await
    }

    pub async fn query_on(&self, connection: &str, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        self.target(connection)?
            .query(sql, args, &self.inner.settings.monitor)
            .await
    }

    /// Raw statement on an open transaction; `?` placeholders.
    pub async fn query_tx(&self, tx: &Tx, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        Target::Transaction(tx.clone())
            .query(sql, args, &self.inner.settings.monitor)
            .await
    }

    /// Raw non-query statement on the default connection.
    pub async fn exec(&self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        self.exec_on(DEFAULT_CONNECTION, sql, args).await
    }

    pub async fn exec_on(&self, connection: &str, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        self.target(connection)?
            .execute(sql, args, &self.inner.settings.monitor)
            .await
    }

    pub async fn exec_tx(&self, tx: &Tx, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        Target::Transaction(tx.clone())
            .execute(sql, args, &self.inner.settings.monitor)
            .await
    }

    /// Run `f` in a transaction on the default connection.
    ///
    /// Statements in `f` join the transaction only through `.with_tx(&tx)`. On SQLite the
    /// transaction holds the only handle, so a statement without it waits out
    /// `wait_timeout_ms` and fails with [`OrmError::Pool`].
    ///
    /// ```ignore
    /// db.with_transaction(|tx| {
    ///     let db = db.clone();
    ///     async move { db.table("users").with_tx(&tx).insert(values! { "name" => "ann" }).await }
    /// })
    /// .await?;
    /// ```
    pub async fn with_transaction<F, Fut, T>(&self, f: F) -> OrmResult<T>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        self.with_transaction_by_level(TransactionIsolation::Default, f)
            .await
    }

    pub async fn with_transaction_by_level<F, Fut, T>(
        &self,
        level: TransactionIsolation,
        f: F,
    ) -> OrmResult<T>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        self.with_transaction_on(DEFAULT_CONNECTION, level, f).await
    }

    pub async fn with_transaction_on<F, Fut, T>(
        &self,
        connection: &str,
        level: TransactionIsolation,
        f: F,
    ) -> OrmResult<T>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        let conn = self.connection(connection)?;
        transaction::run(&conn, connection, level, f).await
    }
}
