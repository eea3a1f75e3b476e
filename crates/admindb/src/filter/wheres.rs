use crate::dialect::quote_with;
use crate::value::Value;
use std::collections::BTreeSet;

/// WHERE text, bound arguments and consumed filter keys threaded through the filter
/// passes of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereState {
    /// `?`-placeholder fragment, without the `WHERE` keyword
    pub sql: String,
    pub args: Vec<Value>,
    /// Filter keys and columns already turned into a clause
    pub consumed: BTreeSet<String>,
}

impl WhereState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    pub fn is_consumed(&self, key: &str) -> bool {
        self.consumed.contains(key)
    }

    pub(crate) fn consume(&mut self, key: &str) {
        if !self.consumed.contains(key) {
            self.consumed.insert(key.to_string());
        }
    }

    /// AND `clause` onto the accumulated text.
    pub(crate) fn push_clause(&mut self, clause: &str) {
        if !self.sql.is_empty() {
            self.sql.push_str(" AND ");
        }
        self.sql.push_str(clause);
    }
}

/// How a [`StaticWhere`] connects to the condition before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhereJoin {
    #[default]
    And,
    Or,
}

/// A condition declared by the table definition rather than the request.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticWhere {
    /// Ignored on the first condition of a list
    pub join: WhereJoin,
    /// `column` or `alias.column`
    pub field: String,
    pub operator: String,
    pub arg: Value,
}

impl StaticWhere {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, arg: impl Into<Value>) -> Self {
        Self {
            join: WhereJoin::And,
            field: field.into(),
            operator: operator.into(),
            arg: arg.into(),
        }
    }

    pub fn or(mut self) -> Self {
        self.join = WhereJoin::Or;
        self
    }

    /// Append `wheres` to `state`.
    ///
    /// A condition is skipped when its column is unknown or was already filtered by an
    /// earlier pass. The emitted columns are consumed once the whole list is rendered,
    /// so a list may hold several conditions on one column.
    pub fn compile<C: AsRef<str>>(
        wheres: &[StaticWhere],
        mut state: WhereState,
        (open, close): (&str, &str),
        columns: &[C],
    ) -> WhereState {
        let mut text = String::new();
        let mut has_or = false;
        let mut emitted = Vec::new();

        for wh in wheres {
            let (qualifier, field) = match wh.field.split_once('.') {
                Some((table, field)) => (Some(table), field),
                None => (None, wh.field.as_str()),
            };
            if state.is_consumed(field) || !columns.iter().any(|c| c.as_ref() == field) {
                continue;
            }
            if !text.is_empty() {
                match wh.join {
                    WhereJoin::And => text.push_str(" AND "),
                    WhereJoin::Or => {
                        has_or = true;
                        text.push_str(" OR ");
                    }
                }
            }
            if let Some(table) = qualifier {
                text.push_str(table);
                text.push('.');
            }
            let operator = match wh.operator.trim() {
                "" => "=",
                op => op,
            };
            text.push_str(&format!("{} {operator} ?", quote_with(field, open, close)));
            state.args.push(wh.arg.clone());
            emitted.push(field);
        }

        if text.is_empty() {
            return state;
        }
        if has_or && !state.is_empty() {
            text = format!("({text})");
        }
        state.push_clause(&text);
        for field in emitted {
            state.consume(field);
        }
        state
    }
}

/// A raw fragment appended after the generated filters.
///
/// A fragment starting with `and`/`or` keeps that connector; otherwise it is ANDed.
/// When nothing precedes it, a leading connector is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWhere {
    pub raw: String,
    pub args: Vec<Value>,
}

impl RawWhere {
    pub fn new(raw: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            raw: raw.into(),
            args,
        }
    }

    pub fn apply(&self, mut state: WhereState) -> WhereState {
        let raw = self.raw.trim();
        if raw.is_empty() {
            return state;
        }
        match strip_connector(raw) {
            Some(rest) if state.is_empty() => state.sql = rest.to_string(),
            Some(_) => {
                state.sql.push(' ');
                state.sql.push_str(raw);
            }
            None => state.push_clause(raw),
        }
        state.args.extend(self.args.iter().cloned());
        state
    }
}

/// `"and x = 1"` → `Some("x = 1")`.
fn strip_connector(raw: &str) -> Option<&str> {
    for connector in ["and", "or"] {
        let Some(head) = raw.get(..connector.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(connector) {
            continue;
        }
        let rest = &raw[connector.len()..];
        if rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
            return Some(rest.trim_start());
        }
    }
    None
}
