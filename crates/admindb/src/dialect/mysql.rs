use super::{Dialect, DialectKind, unsupported};
use crate::error::OrmResult;
use crate::transaction::TransactionIsolation;

/// MySQL / MariaDB: backtick identifiers, native `LIMIT`/`OFFSET`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mysql;

impl Dialect for Mysql {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn delimiters(&self) -> (&'static str, &'static str) {
        ("`", "`")
    }

    fn show_columns(&self, table: &str) -> String {
        format!("SHOW COLUMNS IN {}", self.quote(table))
    }

    fn show_tables(&self) -> String {
        "SHOW TABLES".to_string()
    }

    fn begin(&self, level: TransactionIsolation) -> OrmResult<Vec<String>> {
        let mut statements = Vec::with_capacity(2);
        match level {
            TransactionIsolation::Default => {}
            TransactionIsolation::Snapshot => return Err(unsupported(self.kind(), level)),
            _ => statements.push(format!("SET TRANSACTION ISOLATION LEVEL {level}")),
        }
        statements.push("START TRANSACTION".to_string());
        Ok(statements)
    }
}

