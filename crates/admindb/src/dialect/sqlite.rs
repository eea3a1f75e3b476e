use super::{Dialect, DialectKind, unsupported};
use crate::error::OrmResult;
use crate::transaction::TransactionIsolation;

/// SQLite: backtick identifiers, native `LIMIT`/`OFFSET`.
///
/// Auto-increment state lives in the `sqlite_sequence` system table, which
/// [`Dialect::show_tables`] callers are expected to skip.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

/// Internal table SQLite creates for `AUTOINCREMENT` columns.
pub const SQLITE_SEQUENCE_TABLE: &str = "sqlite_sequence";

impl Dialect for Sqlite {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn delimiters(&self) -> (&'static str, &'static str) {
        ("`", "`")
    }

    fn show_columns(&self, table: &str) -> String {
        format!("PRAGMA table_info({})", self.quote(table))
    }

    fn show_tables(&self) -> String {
        "SELECT name AS tablename FROM sqlite_master WHERE type = 'table'".to_string()
    }

    fn table_name_column(&self) -> Option<&'static str> {
        Some("tablename")
    }

    /// SQLite transactions are always serializable; only that level (or the
    /// default) can be requested.
    fn begin(&self, level: TransactionIsolation) -> OrmResult<Vec<String>> {
        match level {
            TransactionIsolation::Default | TransactionIsolation::Serializable => {
                Ok(vec!["BEGIN".to_string()])
            }
            _ => Err(unsupported(self.kind(), level)),
        }
    }
}
