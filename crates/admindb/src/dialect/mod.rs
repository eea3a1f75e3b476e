//! Per-engine SQL rendering.
//!
//! A [`Dialect`] turns a [`SqlComponent`] into engine-specific SQL text and fills the
//! component's bound-argument list in placeholder order. Components always render `?`
//! placeholders; [`Dialect::prepare`] is the last step before a statement reaches a
//! connection and converts them to the engine's native form (`$n`, `@pN`).
//!
//! Dialects are stateless and shared as `&'static dyn Dialect`:
//!
//! ```ignore
//! use admindb::dialect::{DialectKind, SqlComponent};
//!
//! let dialect = "postgresql".parse::<DialectKind>()?.dialect();
//! let mut comp = SqlComponent::new("users");
//! let sql = dialect.select(&mut comp);
//! assert_eq!(sql, r#"SELECT * FROM "users""#);
//! # Ok::<(), admindb::OrmError>(())
//! ```

mod component;
mod mssql;
mod mysql;
mod postgres;
pub mod rewrite;
mod sqlite;

pub use component::{Join, SqlComponent, UpdateRaw, Where};
pub(crate) use component::{quote_field, quote_table};
pub use mssql::Mssql;
pub use mysql::Mysql;
pub use postgres::Postgres;
pub use rewrite::{MssqlLimitRewriter, SqlRewriter};
pub use sqlite::{SQLITE_SEQUENCE_TABLE, Sqlite};

use crate::error::{OrmError, OrmResult};
use crate::transaction::TransactionIsolation;
use std::fmt;
use std::str::FromStr;

/// Engine identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    Mysql,
    Postgresql,
    Mssql,
    Sqlite,
}

impl DialectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DialectKind::Mysql => "mysql",
            DialectKind::Postgresql => "postgresql",
            DialectKind::Mssql => "mssql",
            DialectKind::Sqlite => "sqlite",
        }
    }

    /// The shared dialect instance for this engine.
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Mysql => &Mysql,
            DialectKind::Postgresql => &Postgres,
            DialectKind::Mssql => &MSSQL,
            DialectKind::Sqlite => &Sqlite,
        }
    }
}

static MSSQL: Mssql = Mssql::new();

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = OrmError;

    /// Exact, case-sensitive match. Anything else is an error rather than a
    /// MySQL-shaped guess.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(DialectKind::Mysql),
            "postgresql" => Ok(DialectKind::Postgresql),
            "mssql" => Ok(DialectKind::Mssql),
            "sqlite" => Ok(DialectKind::Sqlite),
            other => Err(OrmError::UnknownDialect(other.to_string())),
        }
    }
}

/// SQL rendering strategy for one database engine.
///
/// The statement methods take the component mutably: they rebuild
/// [`SqlComponent::bound_args`] from scratch on every call and return the statement
/// text, so rendering the same component twice gives identical output.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn kind(&self) -> DialectKind;

    /// Opening and closing identifier delimiters.
    fn delimiters(&self) -> (&'static str, &'static str);

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Quote one identifier, doubling any embedded closing delimiter.
    fn quote(&self, ident: &str) -> String {
        let (open, close) = self.delimiters();
        quote_with(ident, open, close)
    }

    fn select(&self, comp: &mut SqlComponent) -> String {
        comp.render_select(self.delimiters())
    }

    fn insert(&self, comp: &mut SqlComponent) -> String {
        comp.render_insert(self.delimiters())
    }

    fn update(&self, comp: &mut SqlComponent) -> String {
        comp.render_update(self.delimiters())
    }

    fn delete(&self, comp: &mut SqlComponent) -> String {
        comp.render_delete(self.delimiters())
    }

    /// Renders through the UPDATE value renderer, not a `SELECT COUNT(...)`.
    ///
    /// The name is misleading and kept for SQL-shape compatibility: the output is
    /// `UPDATE <table> SET ...` built from the component's values and raw updates.
    /// Builders count rows with a `count(*)` projection through [`Dialect::select`].
    fn count(&self, comp: &mut SqlComponent) -> String {
        comp.render_update(self.delimiters())
    }

    fn show_columns(&self, table: &str) -> String;

    fn show_tables(&self) -> String;

    /// Column holding the table name in [`Dialect::show_tables`] rows. `None` means
    /// the first column.
    fn table_name_column(&self) -> Option<&'static str> {
        None
    }

    /// Statements that open a transaction at `level`.
    fn begin(&self, level: TransactionIsolation) -> OrmResult<Vec<String>>;

    /// Final text transform before the statement is sent to a connection.
    fn prepare(&self, sql: &str) -> String {
        sql.to_string()
    }
}

pub(crate) fn quote_with(ident: &str, open: &str, close: &str) -> String {
    let mut doubled = String::with_capacity(close.len() * 2);
    doubled.push_str(close);
    doubled.push_str(close);
    format!("{open}{}{close}", ident.replace(close, &doubled))
}

/// Escape a value for use inside a single-quoted SQL literal.
pub(crate) fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub(crate) fn unsupported(kind: DialectKind, level: TransactionIsolation) -> OrmError {
    OrmError::UnsupportedIsolation {
        dialect: kind.as_str().to_string(),
        level: level.to_string(),
    }
}

/// Replace every `?` outside quoted text with `placeholder(n)`, `n` starting at 1.
///
/// Single-quoted literals, double-quoted and backtick identifiers and `[...]` names
/// are copied through untouched.
pub fn number_placeholders(sql: &str, placeholder: impl Fn(usize) -> String) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    let mut closing: Option<char> = None;
    for ch in sql.chars() {
        match closing {
            Some(end) => {
                out.push(ch);
                if ch == end {
                    closing = None;
                }
            }
            None => match ch {
                '?' => {
                    n += 1;
                    out.push_str(&placeholder(n));
                }
                '\'' | '"' | '`' => {
                    closing = Some(ch);
                    out.push(ch);
                }
                '[' => {
                    closing = Some(']');
                    out.push(ch);
                }
                _ => out.push(ch),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests;
