//! Text-level statement rewrites applied right before execution.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A pre-execution SQL text transform.
///
/// Returns `None` when the statement is not a shape the rewriter handles; callers then
/// send the statement unchanged.
pub trait SqlRewriter: Send + Sync + fmt::Debug {
    fn rewrite(&self, sql: &str) -> Option<String>;
}

/// Rewrites `SELECT ... [ORDER BY ...] LIMIT offset,count` for SQL Server, which has
/// no `LIMIT`.
///
/// Without `ORDER BY`:
///
/// ```text
/// SELECT TOP {count} * FROM (
///     SELECT TOP {offset+count} ROW_NUMBER() OVER (ORDER BY (SELECT 0)) AS ROWNUMBER_, {fields}
///     FROM {from}) AS TMP_
/// WHERE ROWNUMBER_ > {offset}
/// ```
///
/// With `ORDER BY`:
///
/// ```text
/// SELECT * FROM (
///     SELECT ROW_NUMBER() OVER (ORDER BY {order}) AS ROWNUMBER_, {fields}
///     FROM {from}) AS TMP_
/// WHERE ROWNUMBER_ > {offset} AND ROWNUMBER_ <= {offset+count}
/// ```
///
/// Matching is purely textual; only the flat shapes the builder renders are supported.
#[derive(Debug)]
pub struct MssqlLimitRewriter {
    ordered: Regex,
    unordered: Regex,
}

impl MssqlLimitRewriter {
    pub fn new() -> Self {
        Self {
            ordered: Regex::new(
                r"(?is)^\s*SELECT\s+(.+?)\s+FROM\s+(.+?)\s+ORDER\s+BY\s+(.+?)\s+LIMIT\s+(\d+)\s*,\s*(\d+)\s*;?\s*$",
            )
            .expect("invalid built-in ordered limit regex"),
            unordered: Regex::new(
                r"(?is)^\s*SELECT\s+(.+?)\s+FROM\s+(.+?)\s+LIMIT\s+(\d+)\s*,\s*(\d+)\s*;?\s*$",
            )
            .expect("invalid built-in limit regex"),
        }
    }

    /// Process-wide instance used by the default SQL Server dialect.
    pub fn shared() -> &'static MssqlLimitRewriter {
        static SHARED: OnceLock<MssqlLimitRewriter> = OnceLock::new();
        SHARED.get_or_init(MssqlLimitRewriter::new)
    }
}

impl Default for MssqlLimitRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlRewriter for MssqlLimitRewriter {
    fn rewrite(&self, sql: &str) -> Option<String> {
        if let Some(caps) = self.ordered.captures(sql) {
            let (offset, count) = bounds(&caps[4], &caps[5])?;
            return Some(format!(
                "SELECT * FROM (SELECT ROW_NUMBER() OVER (ORDER BY {order}) AS ROWNUMBER_, {fields} \
                 FROM {from}) AS TMP_ WHERE ROWNUMBER_ > {offset} AND ROWNUMBER_ <= {end}",
                order = &caps[3],
                fields = &caps[1],
                from = &caps[2],
                end = offset + count,
            ));
        }
        if let Some(caps) = self.unordered.captures(sql) {
            let (offset, count) = bounds(&caps[3], &caps[4])?;
            return Some(format!(
                "SELECT TOP {count} * FROM (SELECT TOP {end} ROW_NUMBER() OVER (ORDER BY (SELECT 0)) \
                 AS ROWNUMBER_, {fields} FROM {from}) AS TMP_ WHERE ROWNUMBER_ > {offset}",
                fields = &caps[1],
                from = &caps[2],
                end = offset + count,
            ));
        }
        None
    }
}

fn bounds(offset: &str, count: &str) -> Option<(u64, u64)> {
    let offset: u64 = offset.parse().ok()?;
    let count: u64 = count.parse().ok()?;
    offset.checked_add(count).map(|_| (offset, count))
}
