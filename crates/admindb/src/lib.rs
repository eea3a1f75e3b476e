//! # admindb
//!
//! Database access layer for admin panels.
//!
//! ## Features
//!
//! - **Four dialects**: MySQL, PostgreSQL, SQL Server and SQLite render from one statement model
//! - **Fluent builder**: `db.table("users").where_eq("id", 1).first()`, with pooled, always-reset state
//! - **Request filters**: `__goadmin` filter keys compile to WHERE fragments and bound arguments
//! - **Loose rows**: cells decode by declared column type into a tagged [`Value`]
//! - **Transactions**: commit on `Ok`, roll back on `Err` or panic (and keep panicking)
//! - **Query monitoring**: every statement is timed and reported through a [`QueryMonitor`]
//!
//! ## Example
//!
//! ```ignore
//! use admindb::{Database, DatabaseList, Parameters, WhereState, values};
//!
//! let db = Database::connect(&DatabaseList::from_file("database.toml")?).await?;
//!
//! let params = Parameters::from_query(request_query, 10, "id");
//! let filters = params.compile_plain(
//!     WhereState::new(),
//!     "goadmin_users",
//!     db.dialect("default")?.delimiters(),
//!     &["id", "username", "name", "created_at"],
//! );
//! let total = db.table("goadmin_users").apply_where(&filters).count().await?;
//! let page = db
//!     .table("goadmin_users")
//!     .apply_where(&filters)
//!     .paginate(&params)
//!     .all()
//!     .await?;
//!
//! db.table("goadmin_users")
//!     .where_eq("id", 1)
//!     .update(values! { "name" => "admin" })
//!     .await?;
//! ```

pub mod builder;
pub mod config;
pub mod connection;
pub mod database;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod filter;
pub mod monitor;
pub mod row;
pub mod transaction;
pub mod types;
pub mod value;

#[cfg(feature = "postgres")]
pub mod pool;

pub use builder::{Sql, StatementPool};
pub use config::{DatabaseConfig, DatabaseList};
pub use connection::{Connection, ExecResult, Transaction};
pub use database::{DEFAULT_CONNECTION, Database, DatabaseBuilder, Settings};
pub use dialect::{Dialect, DialectKind, SqlComponent};
pub use error::{OrmError, OrmResult};
pub use filter::{FilterOperator, Parameters, RawWhere, StaticWhere, WhereJoin, WhereState};
pub use monitor::{
    MonitorSettings, NoopMonitor, QueryContext, QueryKind, QueryMonitor, QueryResult, QueryStats,
    StatsMonitor, TracingMonitor,
};
pub use row::{FromRow, FromValue, Row};
pub use transaction::{TransactionIsolation, Tx};
pub use types::ColumnClass;
pub use value::{Value, Values};

/// Abort on a programming error: log it under the SQL target, then panic with `message`.
#[track_caller]
pub(crate) fn fault(message: impl std::fmt::Display) -> ! {
    tracing::error!(target: monitor::SQL_TARGET, "{message}");
    panic!("{message}")
}
