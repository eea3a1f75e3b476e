use super::types::{QueryContext, QueryKind, QueryMonitor, QueryResult};
use super::{SQL_TARGET, truncate_sql_bytes};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl QueryMonitor for NoopMonitor {
    fn on_query_complete(&self, _ctx: &QueryContext, _duration: Duration, _result: &QueryResult) {}
}

/// Emits `tracing` events under the `admindb.sql` target.
///
/// Successful statements log at `debug`, failures and slow statements at `warn`.
#[derive(Debug, Clone)]
pub struct TracingMonitor {
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingMonitor {
    fn default() -> Self {
        Self {
            max_sql_length: Some(200),
        }
    }
}

impl TracingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

impl QueryMonitor for TracingMonitor {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        let sql = self.truncate_sql(&ctx.sql);
        match result {
            QueryResult::Error(error) => tracing::warn!(
                target: SQL_TARGET,
                dialect = %ctx.dialect,
                connection = %ctx.connection,
                kind = ?ctx.kind,
                param_count = ctx.param_count,
                in_transaction = ctx.in_transaction,
                elapsed_ms = duration.as_millis() as u64,
                error = %error,
                sql = %sql,
                "statement failed"
            ),
            _ => tracing::debug!(
                target: SQL_TARGET,
                dialect = %ctx.dialect,
                connection = %ctx.connection,
                kind = ?ctx.kind,
                param_count = ctx.param_count,
                in_transaction = ctx.in_transaction,
                elapsed_ms = duration.as_millis() as u64,
                result = %result,
                sql = %sql,
                "statement executed"
            ),
        }
    }

    fn on_slow_query(&self, ctx: &QueryContext, duration: Duration) {
        tracing::warn!(
            target: SQL_TARGET,
            dialect = %ctx.dialect,
            connection = %ctx.connection,
            kind = ?ctx.kind,
            elapsed_ms = duration.as_millis() as u64,
            sql = %self.truncate_sql(&ctx.sql),
            "slow statement"
        );
    }
}

/// Counts statements per kind and remembers the slowest one.
#[derive(Debug, Default)]
pub struct StatsMonitor {
    total_queries: AtomicU64,
    failed_queries: AtomicU64,
    slow_queries: AtomicU64,
    total_duration_nanos: AtomicU64,
    select_count: AtomicU64,
    insert_count: AtomicU64,
    update_count: AtomicU64,
    delete_count: AtomicU64,
    max_duration_nanos: AtomicU64,
    slowest_query: Mutex<Option<String>>,
}

/// Snapshot of [`StatsMonitor`] counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub slow_queries: u64,
    pub total_duration: Duration,
    pub select_count: u64,
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    pub max_duration: Duration,
    pub slowest_query: Option<String>,
}

impl StatsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> QueryStats {
        QueryStats {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            slow_queries: self.slow_queries.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(self.total_duration_nanos.load(Ordering::Relaxed)),
            select_count: self.select_count.load(Ordering::Relaxed),
            insert_count: self.insert_count.load(Ordering::Relaxed),
            update_count: self.update_count.load(Ordering::Relaxed),
            delete_count: self.delete_count.load(Ordering::Relaxed),
            max_duration: Duration::from_nanos(self.max_duration_nanos.load(Ordering::Relaxed)),
            slowest_query: self
                .slowest_query
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total_queries,
            &self.failed_queries,
            &self.slow_queries,
            &self.total_duration_nanos,
            &self.select_count,
            &self.insert_count,
            &self.update_count,
            &self.delete_count,
            &self.max_duration_nanos,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.slowest_query.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl QueryMonitor for StatsMonitor {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        if result.is_error() {
            self.failed_queries.fetch_add(1, Ordering::Relaxed);
        }

        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.total_duration_nanos.fetch_add(nanos, Ordering::Relaxed);

        match ctx.kind {
            QueryKind::Select => self.select_count.fetch_add(1, Ordering::Relaxed),
            QueryKind::Insert => self.insert_count.fetch_add(1, Ordering::Relaxed),
            QueryKind::Update => self.update_count.fetch_add(1, Ordering::Relaxed),
            QueryKind::Delete => self.delete_count.fetch_add(1, Ordering::Relaxed),
            QueryKind::Other => 0,
        };

        let previous = self.max_duration_nanos.fetch_max(nanos, Ordering::Relaxed);
        if nanos > previous {
            *self.slowest_query.lock().unwrap_or_else(|e| e.into_inner()) = Some(ctx.sql.clone());
        }
    }

    fn on_slow_query(&self, _ctx: &QueryContext, _duration: Duration) {
        self.slow_queries.fetch_add(1, Ordering::Relaxed);
    }
}
