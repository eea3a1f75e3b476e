use super::rewrite::{MssqlLimitRewriter, SqlRewriter};
use super::{Dialect, DialectKind, SqlComponent, escape_literal, number_placeholders};
use crate::error::OrmResult;
use crate::transaction::TransactionIsolation;

/// SQL Server: `[bracket]` identifiers, `@pN` placeholders, and a text rewrite of
/// `LIMIT offset,count` pagination into `TOP`/`ROW_NUMBER()` subqueries.
#[derive(Debug, Clone, Copy)]
pub struct Mssql {
    rewriter: Option<&'static dyn SqlRewriter>,
}

impl Mssql {
    /// Dialect using the built-in [`MssqlLimitRewriter`].
    pub const fn new() -> Self {
        Self { rewriter: None }
    }

    /// Dialect using a caller-provided pagination rewrite.
    pub const fn with_rewriter(rewriter: &'static dyn SqlRewriter) -> Self {
        Self {
            rewriter: Some(rewriter),
        }
    }

    fn rewrite(&self, sql: &str) -> Option<String> {
        match self.rewriter {
            Some(rewriter) => rewriter.rewrite(sql),
            None => MssqlLimitRewriter::shared().rewrite(sql),
        }
    }
}

impl Default for Mssql {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for Mssql {
    fn kind(&self) -> DialectKind {
        DialectKind::Mssql
    }

    fn delimiters(&self) -> (&'static str, &'static str) {
        ("[", "]")
    }

    fn select(&self, comp: &mut SqlComponent) -> String {
        comp.render_select_limit_pair(self.delimiters())
    }

    fn show_columns(&self, table: &str) -> String {
        format!(
            "SELECT column_name, data_type FROM information_schema.columns WHERE table_name = '{}'",
            escape_literal(table)
        )
    }

    fn show_tables(&self) -> String {
        "SELECT * FROM information_schema.TABLES".to_string()
    }

    fn table_name_column(&self) -> Option<&'static str> {
        Some("TABLE_NAME")
    }

    fn begin(&self, level: TransactionIsolation) -> OrmResult<Vec<String>> {
        let mut statements = Vec::with_capacity(2);
        if level != TransactionIsolation::Default {
            statements.push(format!("SET TRANSACTION ISOLATION LEVEL {level}"));
        }
        statements.push("BEGIN TRANSACTION".to_string());
        Ok(statements)
    }

    /// Pagination rewrite first, then `?` → `@p1, @p2, ...`. Statements the rewrite
    /// does not recognize keep their original shape.
    fn prepare(&self, sql: &str) -> String {
        let rewritten = self.rewrite(sql);
        let sql = rewritten.as_deref().unwrap_or(sql);
        number_placeholders(sql, |n| format!("@p{n}"))
    }
}
