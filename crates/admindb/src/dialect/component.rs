use super::quote_with;
use crate::value::{Value, Values};

/// One `LEFT JOIN <table> ON <left_field> <operator> <right_field>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub left_field: String,
    pub operator: String,
    pub right_field: String,
}

/// One structured WHERE condition: `<field> <operator> <placeholder>`.
///
/// `placeholder` is `?` for scalar operators and `(?, ?, ...)` for `IN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    pub field: String,
    pub operator: String,
    pub placeholder: String,
}

/// A raw `SET` expression with its own arguments, e.g. `hits = hits + ?`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRaw {
    pub expression: String,
    pub args: Vec<Value>,
}

/// Mutable description of one statement, rendered by a [`Dialect`](super::Dialect).
///
/// `args` holds the structured WHERE arguments in condition order; raw WHERE fragments
/// carry theirs in `where_raw_args` so they always bind after the structured ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlComponent {
    pub table: String,
    pub fields: Vec<String>,
    /// Aggregate per field, parallel to `fields`
    pub functions: Vec<Option<String>>,
    pub joins: Vec<Join>,
    pub wheres: Vec<Where>,
    pub args: Vec<Value>,
    pub where_raw: Vec<String>,
    pub where_raw_args: Vec<Value>,
    pub update_raws: Vec<UpdateRaw>,
    pub group: String,
    pub order: String,
    pub limit: String,
    pub offset: String,
    pub values: Values,

    statement: String,
    bound: Vec<Value>,
}

impl SqlComponent {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Clear every field, keeping allocations for reuse.
    pub fn reset(&mut self) {
        self.table.clear();
        self.fields.clear();
        self.functions.clear();
        self.joins.clear();
        self.wheres.clear();
        self.args.clear();
        self.where_raw.clear();
        self.where_raw_args.clear();
        self.update_raws.clear();
        self.group.clear();
        self.order.clear();
        self.limit.clear();
        self.offset.clear();
        self.values.clear();
        self.statement.clear();
        self.bound.clear();
    }

    /// Whether every field is back to its empty state.
    pub fn is_reset(&self) -> bool {
        self == &Self::default()
    }

    /// Text produced by the last render.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Arguments of the last render, in placeholder order.
    pub fn bound_args(&self) -> &[Value] {
        &self.bound
    }

    pub fn take_bound_args(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.bound)
    }

    pub(crate) fn render_select(&mut self, delims: (&str, &str)) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.fields_sql(delims),
            quote_table(&self.table, delims)
        );
        sql.push_str(&self.joins_sql(delims));
        sql.push_str(&self.wheres_sql(delims));
        sql.push_str(&self.group_sql());
        sql.push_str(&self.order_sql());
        if !self.limit.is_empty() {
            sql.push_str(" LIMIT ");
            sql.push_str(&self.limit);
        }
        if !self.offset.is_empty() {
            sql.push_str(" OFFSET ");
            sql.push_str(&self.offset);
        }
        self.bind_where_args(Vec::new());
        self.finish(sql)
    }

    /// SELECT with MySQL-style `LIMIT offset,count`, which the SQL Server rewrite
    /// step consumes.
    pub(crate) fn render_select_limit_pair(&mut self, delims: (&str, &str)) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.fields_sql(delims),
            quote_table(&self.table, delims)
        );
        sql.push_str(&self.joins_sql(delims));
        sql.push_str(&self.wheres_sql(delims));
        sql.push_str(&self.group_sql());
        sql.push_str(&self.order_sql());
        if !self.limit.is_empty() {
            let offset = if self.offset.is_empty() {
                "0"
            } else {
                self.offset.as_str()
            };
            sql.push_str(&format!(" LIMIT {offset},{}", self.limit));
        } else if !self.offset.is_empty() {
            sql.push_str(&format!(" OFFSET {} ROWS", self.offset));
        }
        self.bind_where_args(Vec::new());
        self.finish(sql)
    }

    pub(crate) fn render_insert(&mut self, delims: (&str, &str)) -> String {
        let mut columns = Vec::with_capacity(self.values.len());
        let mut marks = Vec::with_capacity(self.values.len());
        let mut bound = Vec::with_capacity(self.values.len());
        for (field, value) in &self.values {
            columns.push(quote_field(field, delims));
            marks.push("?");
            bound.push(value.clone());
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_table(&self.table, delims),
            columns.join(", "),
            marks.join(", ")
        );
        self.bound = bound;
        self.finish(sql)
    }

    /// `UPDATE ... SET` from `values` then `update_raws`.
    ///
    /// # Panics
    ///
    /// Panics when both `values` and `update_raws` are empty.
    pub(crate) fn render_update(&mut self, delims: (&str, &str)) -> String {
        if self.values.is_empty() && self.update_raws.is_empty() {
            crate::fault("update without values or raw expressions");
        }
        let mut sets = Vec::with_capacity(self.values.len() + self.update_raws.len());
        let mut bound = Vec::new();
        for (field, value) in &self.values {
            sets.push(format!("{} = ?", quote_field(field, delims)));
            bound.push(value.clone());
        }
        for raw in &self.update_raws {
            sets.push(raw.expression.clone());
            bound.extend(raw.args.iter().cloned());
        }
        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_table(&self.table, delims),
            sets.join(", ")
        );
        sql.push_str(&self.wheres_sql(delims));
        self.bind_where_args(bound);
        self.finish(sql)
    }

    pub(crate) fn render_delete(&mut self, delims: (&str, &str)) -> String {
        let mut sql = format!("DELETE FROM {}", quote_table(&self.table, delims));
        sql.push_str(&self.wheres_sql(delims));
        self.bind_where_args(Vec::new());
        self.finish(sql)
    }

    fn finish(&mut self, sql: String) -> String {
        self.statement.clone_from(&sql);
        sql
    }

    fn bind_where_args(&mut self, mut leading: Vec<Value>) {
        leading.extend(self.args.iter().cloned());
        leading.extend(self.where_raw_args.iter().cloned());
        self.bound = leading;
    }

    fn fields_sql(&self, delims: (&str, &str)) -> String {
        if self.fields.is_empty() {
            return "*".to_string();
        }
        self.fields
            .iter()
            .enumerate()
            .map(|(i, field)| match self.functions.get(i).and_then(Option::as_deref) {
                Some(func) => format!("{func}({})", quote_field(field, delims)),
                None => quote_field(field, delims),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn joins_sql(&self, delims: (&str, &str)) -> String {
        let mut sql = String::new();
        for join in &self.joins {
            sql.push_str(&format!(
                " LEFT JOIN {} ON {} {} {}",
                quote_table(&join.table, delims),
                quote_field(&join.left_field, delims),
                join.operator,
                quote_field(&join.right_field, delims)
            ));
        }
        sql
    }

    fn wheres_sql(&self, delims: (&str, &str)) -> String {
        let mut parts: Vec<String> = self
            .wheres
            .iter()
            .map(|w| {
                format!(
                    "{} {} {}",
                    quote_field(&w.field, delims),
                    w.operator,
                    w.placeholder
                )
            })
            .collect();
        parts.extend(
            self.where_raw
                .iter()
                .filter(|raw| !raw.trim().is_empty())
                .cloned(),
        );
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    fn group_sql(&self) -> String {
        if self.group.is_empty() {
            String::new()
        } else {
            format!(" GROUP BY {}", self.group)
        }
    }

    fn order_sql(&self) -> String {
        if self.order.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", self.order)
        }
    }
}

/// Quote a table name; `schema.table` quotes both parts.
pub(crate) fn quote_table(table: &str, (open, close): (&str, &str)) -> String {
    match table.split_once('.') {
        Some((schema, name)) => format!(
            "{}.{}",
            quote_with(schema, open, close),
            quote_with(name, open, close)
        ),
        None => quote_with(table, open, close),
    }
}

/// Quote a field reference.
///
/// `*` stays bare, `t.col` quotes both parts, `t.*` quotes the qualifier only and
/// `col AS alias` quotes both names.
pub(crate) fn quote_field(field: &str, delims: (&str, &str)) -> String {
    let (open, close) = delims;
    if let Some(idx) = find_alias(field) {
        let (expr, alias) = (&field[..idx], &field[idx + 4..]);
        return format!(
            "{} AS {}",
            quote_field(expr.trim(), delims),
            quote_with(alias.trim(), open, close)
        );
    }
    if field == "*" {
        return field.to_string();
    }
    match field.split_once('.') {
        Some((qualifier, "*")) => format!("{}.*", quote_with(qualifier, open, close)),
        Some((qualifier, column)) => format!(
            "{}.{}",
            quote_with(qualifier, open, close),
            quote_with(column, open, close)
        ),
        None => quote_with(field, open, close),
    }
}

fn find_alias(field: &str) -> Option<usize> {
    field.to_ascii_lowercase().find(" as ")
}
