use super::{Dialect, DialectKind, escape_literal, number_placeholders, unsupported};
use crate::error::OrmResult;
use crate::transaction::TransactionIsolation;

/// PostgreSQL: double-quoted identifiers, `$n` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgresql
    }

    fn delimiters(&self) -> (&'static str, &'static str) {
        ("\"", "\"")
    }

    fn show_columns(&self, table: &str) -> String {
        format!(
            "SELECT * FROM information_schema.columns WHERE table_name = '{}'",
            escape_literal(table)
        )
    }

    fn show_tables(&self) -> String {
        "SELECT tablename FROM pg_catalog.pg_tables \
         WHERE schemaname != 'pg_catalog' AND schemaname != 'information_schema'"
            .to_string()
    }

    fn table_name_column(&self) -> Option<&'static str> {
        Some("tablename")
    }

    fn begin(&self, level: TransactionIsolation) -> OrmResult<Vec<String>> {
        match level {
            TransactionIsolation::Default => Ok(vec!["BEGIN".to_string()]),
            TransactionIsolation::Snapshot => Err(unsupported(self.kind(), level)),
            _ => Ok(vec![format!("BEGIN ISOLATION LEVEL {level}")]),
        }
    }

    fn prepare(&self, sql: &str) -> String {
        number_placeholders(sql, |n| format!("${n}"))
    }
}
