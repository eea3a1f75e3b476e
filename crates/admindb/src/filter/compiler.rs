use super::{
    FilterOperator, INDEX_INFIX, JOIN_INFIX, OPERATOR_SUFFIX, Parameters, RANGE_END_SUFFIX,
    RANGE_START_SUFFIX, WhereState,
};
use crate::dialect::{quote_table, quote_with};
use crate::monitor::SQL_TARGET;
use crate::value::Value;
use std::collections::BTreeSet;

/// Comparison chosen for one filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Sql(&'static str),
    In,
}

impl Parameters {
    /// Compile the request filters onto `state`.
    ///
    /// `table` qualifies known `columns`; join-qualified keys use their alias as is.
    /// `transform(column, value, index_suffix)` rewrites each value before it is bound.
    /// Keys already in `state.consumed` are skipped unless they are repeated with an
    /// index, and every key turned into a clause is added to it, so compiling the same
    /// parameters twice through one state adds nothing the second time.
    pub fn compile<C, F>(
        &self,
        mut state: WhereState,
        table: &str,
        delimiters: (&str, &str),
        columns: &[C],
        transform: F,
    ) -> WhereState
    where
        C: AsRef<str>,
        F: Fn(&str, &str, &str) -> String,
    {
        let multi: BTreeSet<&str> = self
            .fields
            .keys()
            .filter_map(|k| k.split_once(INDEX_INFIX).map(|(key, _)| key))
            .collect();

        for (raw_key, values) in &self.fields {
            if values.is_empty() || raw_key.contains(',') || raw_key.contains(OPERATOR_SUFFIX) {
                continue;
            }
            let (key, index_suffix) = match raw_key.split_once(INDEX_INFIX) {
                Some((key, _)) => (key, &raw_key[key.len()..]),
                None => (raw_key.as_str(), ""),
            };
            if !multi.contains(key) && state.is_consumed(key) {
                continue;
            }

            let (name, comparison) = if let Some(name) = key.strip_suffix(RANGE_END_SUFFIX) {
                (name, Comparison::Sql("<="))
            } else if let Some(name) = key.strip_suffix(RANGE_START_SUFFIX) {
                (name, Comparison::Sql(">="))
            } else if values.len() > 1 {
                (key, Comparison::In)
            } else {
                match self.field_operator(key, index_suffix) {
                    Some(FilterOperator::Free) => {
                        state.consume(key);
                        continue;
                    }
                    Some(op) => match op.as_sql() {
                        Some(sql) => (key, Comparison::Sql(sql)),
                        None => continue,
                    },
                    None => {
                        tracing::debug!(target: SQL_TARGET, field = %key, "unknown filter operator, skipped");
                        continue;
                    }
                }
            };

            let Some(column) = resolve_column(name, table, delimiters, columns) else {
                continue;
            };
            match comparison {
                Comparison::In => {
                    let marks = vec!["?"; values.len()].join(", ");
                    state.push_clause(&format!("{column} IN ({marks})"));
                    for value in values {
                        state
                            .args
                            .push(Value::Text(transform(name, value, index_suffix)));
                    }
                }
                Comparison::Sql(op) => {
                    // One placeholder, one argument: a repeated range bound keeps its first value.
                    if values.len() > 1 {
                        tracing::debug!(target: SQL_TARGET, field = %key, "extra filter values ignored");
                    }
                    state.push_clause(&format!("{column} {op} ?"));
                    let value = transform(name, &values[0], index_suffix);
                    let value = if op == "LIKE" && !values[0].contains('%') {
                        format!("%{value}%")
                    } else {
                        value
                    };
                    state.args.push(Value::Text(value));
                }
            }
            state.consume(key);
            state.consume(name);
        }

        self.compile_or_groups(state, table, delimiters, columns, &transform)
    }

    /// `a,b=value` keys: one parenthesized OR over the listed columns.
    fn compile_or_groups<C, F>(
        &self,
        mut state: WhereState,
        table: &str,
        delimiters: (&str, &str),
        columns: &[C],
        transform: &F,
    ) -> WhereState
    where
        C: AsRef<str>,
        F: Fn(&str, &str, &str) -> String,
    {
        for (key, values) in &self.fields {
            if !key.contains(',') || state.is_consumed(key) {
                continue;
            }
            let Some(value) = values.first() else {
                continue;
            };
            let op = if value.contains('%') { "LIKE" } else { "=" };

            let mut parts = Vec::new();
            for name in key.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if let Some(column) = resolve_column(name, table, delimiters, columns) {
                    parts.push(format!("{column} {op} ?"));
                    state.args.push(Value::Text(transform(name, value, "")));
                }
            }
            if parts.is_empty() {
                continue;
            }
            state.push_clause(&format!("({})", parts.join(" OR ")));
            state.consume(key);
        }
        state
    }

    /// [`Parameters::compile`] binding values unchanged.
    pub fn compile_plain<C: AsRef<str>>(
        &self,
        state: WhereState,
        table: &str,
        delimiters: (&str, &str),
        columns: &[C],
    ) -> WhereState {
        self.compile(state, table, delimiters, columns, |_, value, _| {
            value.to_string()
        })
    }
}

/// Qualified, quoted reference for a filter name, or `None` when the column is unknown.
fn resolve_column<C: AsRef<str>>(
    name: &str,
    table: &str,
    (open, close): (&str, &str),
    columns: &[C],
) -> Option<String> {
    if columns.iter().any(|c| c.as_ref() == name) {
        let column = quote_with(name, open, close);
        if table.is_empty() {
            return Some(column);
        }
        return Some(format!("{}.{column}", quote_table(table, (open, close))));
    }
    let (alias, column) = name.split_once(JOIN_INFIX)?;
    if alias.is_empty() || column.is_empty() {
        return None;
    }
    Some(format!("{alias}.{}", quote_with(column, open, close)))
}
