//! Statement monitoring.
//!
//! Every statement the crate sends to a connection is reported to a [`QueryMonitor`]
//! with its duration and outcome. The default [`TracingMonitor`] emits `tracing` events
//! under the `admindb.sql` target; [`StatsMonitor`] keeps in-process counters.
//!
//! ```rust,ignore
//! use admindb::monitor::{MonitorSettings, StatsMonitor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let stats = Arc::new(StatsMonitor::new());
//! let settings = MonitorSettings::new()
//!     .with_monitor(stats.clone())
//!     .with_slow_query_threshold(Duration::from_millis(200));
//! ```

mod monitors;
mod types;

pub use monitors::{NoopMonitor, QueryStats, StatsMonitor, TracingMonitor};
pub use types::{QueryContext, QueryKind, QueryMonitor, QueryResult};

use std::sync::Arc;
use std::time::Duration;

/// tracing target for statement events.
pub const SQL_TARGET: &str = "admindb.sql";

/// Which monitor receives events and when a statement counts as slow.
#[derive(Clone)]
pub struct MonitorSettings {
    monitor: Arc<dyn QueryMonitor>,
    slow_query_threshold: Option<Duration>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            monitor: Arc::new(TracingMonitor::default()),
            slow_query_threshold: None,
        }
    }
}

impl std::fmt::Debug for MonitorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSettings")
            .field("slow_query_threshold", &self.slow_query_threshold)
            .finish_non_exhaustive()
    }
}

impl MonitorSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn QueryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn slow_query_threshold(&self) -> Option<Duration> {
        self.slow_query_threshold
    }

    /// Report one finished statement.
    pub fn observe(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        self.monitor.on_query_complete(ctx, duration, result);
        if let Some(threshold) = self.slow_query_threshold {
            if duration >= threshold {
                self.monitor.on_slow_query(ctx, duration);
            }
        }
    }
}

/// Cut `sql` to at most `max_bytes`, backing off to a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Skip leading whitespace, comments and parentheses.
fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    let Some(head) = s.get(..keyword.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return false;
    }
    s[keyword.len()..]
        .chars()
        .next()
        .is_none_or(|c| !c.is_ascii_alphanumeric() && c != '_')
}
