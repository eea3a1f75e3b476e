use super::{starts_with_keyword, strip_sql_prefix};
use crate::dialect::DialectKind;
use std::fmt;
use std::time::Duration;

/// Statement kind, detected from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, PRAGMA, SHOW, transaction control...
    Other,
}

impl QueryKind {
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "SELECT") {
            QueryKind::Select
        } else if starts_with_keyword(trimmed, "INSERT") {
            QueryKind::Insert
        } else if starts_with_keyword(trimmed, "UPDATE") {
            QueryKind::Update
        } else if starts_with_keyword(trimmed, "DELETE") {
            QueryKind::Delete
        } else {
            QueryKind::Other
        }
    }
}

/// What is known about a statement when it is reported.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Statement as sent to the connection (after placeholder conversion).
    pub sql: String,
    pub kind: QueryKind,
    pub param_count: usize,
    pub dialect: DialectKind,
    /// Registry name of the connection.
    pub connection: String,
    pub in_transaction: bool,
}

impl QueryContext {
    pub fn new(sql: &str, param_count: usize, dialect: DialectKind) -> Self {
        Self {
            sql: sql.to_string(),
            kind: QueryKind::from_sql(sql),
            param_count,
            dialect,
            connection: String::new(),
            in_transaction: false,
        }
    }

    pub fn with_connection(mut self, name: impl Into<String>) -> Self {
        self.connection = name.into();
        self
    }

    pub fn in_transaction(mut self, in_transaction: bool) -> Self {
        self.in_transaction = in_transaction;
        self
    }
}

const MAX_ERROR_LEN: usize = 512;

/// Outcome of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(usize),
    Affected(u64),
    /// Error text, truncated to 512 bytes.
    Error(String),
}

impl QueryResult {
    pub fn error(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if msg.len() > MAX_ERROR_LEN {
            Self::Error(format!(
                "{}...",
                super::truncate_sql_bytes(&msg, MAX_ERROR_LEN)
            ))
        } else {
            Self::Error(msg)
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error(_))
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Rows(n) => write!(f, "{n} rows"),
            QueryResult::Affected(n) => write!(f, "{n} affected"),
            QueryResult::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Receives an event for every executed statement.
pub trait QueryMonitor: Send + Sync {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult);

    /// Called after `on_query_complete` when the statement crossed the slow threshold.
    fn on_slow_query(&self, _ctx: &QueryContext, _duration: Duration) {}
}
