//! Fluent statement builder.
//!
//! A [`Sql`] builder is obtained from [`Database::table`](crate::Database::table), configured
//! with chainable mutators, and consumed by exactly one terminal call (`first`, `all`,
//! `count`, `insert`, `update`, `delete`, `exec`, ...). The underlying
//! [`SqlComponent`] comes from the registry's [`StatementPool`] and goes back, reset,
//! when the builder is dropped, whatever the terminal call returned.
//!
//! ```ignore
//! let rows = db
//!     .table("goadmin_users")
//!     .select(["id", "username"])
//!     .where_eq("status", 1)
//!     .order_by("id", "desc")
//!     .take(20)
//!     .all()
//!     .await?;
//! ```

pub mod pool;

pub use pool::{Checkout, StatementPool};

use crate::connection::Target;
use crate::database::Settings;
use crate::dialect::{
    DialectKind, Join, SQLITE_SEQUENCE_TABLE, SqlComponent, UpdateRaw, Where, quote_field,
    quote_table,
};
use crate::error::{OrmError, OrmResult};
use crate::filter::{Parameters, WhereState};
use crate::row::{FromRow, Row};
use crate::transaction::{self, TransactionIsolation, Tx};
use crate::value::{Value, Values};
use std::future::Future;
use std::sync::{Arc, OnceLock};

/// Error text embedded-compatibility engines report for `INSERT ... RETURNING`.
const RETURNING_UNSUPPORTED: &str = "Syntax error in SQL statement";

fn function_regex() -> &'static regex::Regex {
    static FUNC_RE: OnceLock<regex::Regex> = OnceLock::new();
    FUNC_RE.get_or_init(|| {
        regex::Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*(.*?)\s*\)\s*$")
            .expect("invalid built-in function regex")
    })
}

/// Chainable statement builder bound to one connection or transaction.
pub struct Sql {
    comp: Checkout,
    target: Target,
    settings: Arc<Settings>,
}

impl std::fmt::Debug for Sql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sql")
            .field("dialect", &self.target.dialect().kind())
            .field("component", &*self.comp)
            .finish_non_exhaustive()
    }
}

impl Sql {
    pub(crate) fn new(
        pool: &Arc<StatementPool>,
        target: Target,
        settings: Arc<Settings>,
        table: &str,
    ) -> Self {
        let mut comp = pool.checkout();
        comp.table.push_str(table);
        Self {
            comp,
            target,
            settings,
        }
    }

    /// Current statement component.
    pub fn component(&self) -> &SqlComponent {
        &self.comp
    }

    fn delimiters(&self) -> (&'static str, &'static str) {
        self.target.dialect().delimiters()
    }

    // ==================== Mutators ====================

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.comp.table = table.into();
        self
    }

    /// Projected fields. `count(*)`/`sum(amount)` style entries become an aggregate
    /// around the inner field.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for field in fields {
            let field = field.as_ref();
            match function_regex().captures(field) {
                Some(caps) => {
                    self.comp.fields.push(caps[2].to_string());
                    self.comp.functions.push(Some(caps[1].to_string()));
                }
                None => {
                    self.comp.fields.push(field.to_string());
                    self.comp.functions.push(None);
                }
            }
        }
        self
    }

    /// `field <operator> ?`, ANDed with the other conditions.
    pub fn and_where(
        mut self,
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.comp.wheres.push(Where {
            field: field.into(),
            operator: operator.into(),
            placeholder: "?".to_string(),
        });
        self.comp.args.push(value.into());
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and_where(field, "=", value)
    }

    /// `field IN (?, ?, ...)` with one placeholder per value.
    ///
    /// # Panics
    ///
    /// Panics when `values` is empty.
    pub fn where_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_list(field.into(), "IN", values)
    }

    /// `field NOT IN (?, ?, ...)`.
    ///
    /// # Panics
    ///
    /// Panics when `values` is empty.
    pub fn where_not_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_list(field.into(), "NOT IN", values)
    }

    fn where_list<I, V>(mut self, field: String, operator: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            crate::fault(format!("{operator} condition on `{field}` without values"));
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.comp.wheres.push(Where {
            field,
            operator: operator.to_string(),
            placeholder: format!("({marks})"),
        });
        self.comp.args.extend(values);
        self
    }

    /// Raw WHERE fragment, ANDed after the structured conditions. Its arguments bind
    /// after theirs.
    pub fn where_raw(mut self, raw: impl Into<String>, args: Vec<Value>) -> Self {
        self.comp.where_raw.push(raw.into());
        self.comp.where_raw_args.extend(args);
        self
    }

    /// Feed a compiled request filter in. A fragment with an `OR` outside parentheses is
    /// wrapped so it stays one condition next to the others.
    pub fn apply_where(self, state: &WhereState) -> Self {
        let sql = state.sql.trim();
        if sql.is_empty() {
            return self;
        }
        let fragment = if has_top_level_or(sql) {
            format!("({sql})")
        } else {
            sql.to_string()
        };
        self.where_raw(fragment, state.args.clone())
    }

    /// Sort and page by the request parameters. The sort field is quoted as a column.
    pub fn paginate(self, params: &Parameters) -> Self {
        let direction = if params.is_ascending() { "asc" } else { "desc" };
        let sql = if params.sort_field.is_empty() {
            self
        } else {
            self.order_by(&params.sort_field, direction)
        };
        sql.skip(params.offset()).take(params.page_size)
    }

    pub fn left_join(
        mut self,
        table: impl Into<String>,
        left_field: impl Into<String>,
        operator: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        self.comp.joins.push(Join {
            table: table.into(),
            left_field: left_field.into(),
            operator: operator.into(),
            right_field: right_field.into(),
        });
        self
    }

    /// Append `field ASC|DESC` to the ORDER BY list.
    ///
    /// # Panics
    ///
    /// Panics when `direction` is not `asc`/`desc` (any case).
    pub fn order_by(mut self, field: &str, direction: &str) -> Self {
        let direction = match direction.to_ascii_lowercase().as_str() {
            "asc" => "ASC",
            "desc" => "DESC",
            _ => crate::fault(format!("invalid sort direction `{direction}`")),
        };
        let clause = format!("{} {direction}", quote_field(field, self.delimiters()));
        push_list(&mut self.comp.order, &clause);
        self
    }

    pub fn order_by_raw(mut self, raw: impl AsRef<str>) -> Self {
        push_list(&mut self.comp.order, raw.as_ref());
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let delims = self.delimiters();
        for field in fields {
            let quoted = quote_field(field.as_ref(), delims);
            push_list(&mut self.comp.group, &quoted);
        }
        self
    }

    pub fn group_by_raw(mut self, raw: impl AsRef<str>) -> Self {
        push_list(&mut self.comp.group, raw.as_ref());
        self
    }

    pub fn skip(mut self, offset: u64) -> Self {
        self.comp.offset = offset.to_string();
        self
    }

    pub fn take(mut self, limit: u64) -> Self {
        self.comp.limit = limit.to_string();
        self
    }

    /// Raw `SET` expression for `update`/`exec`, e.g. `("hits = hits + ?", vec![1.into()])`.
    pub fn update_raw(mut self, expression: impl Into<String>, args: Vec<Value>) -> Self {
        self.comp.update_raws.push(UpdateRaw {
            expression: expression.into(),
            args,
        });
        self
    }

    /// Run on an open transaction instead of the pooled connection.
    pub fn with_tx(mut self, tx: &Tx) -> Self {
        self.target = Target::Transaction(tx.clone());
        self
    }

    // ==================== Debug rendering ====================

    /// Render the SELECT this builder would run, without executing it.
    pub fn to_select_sql(&self) -> (String, Vec<Value>) {
        let mut comp = (*self.comp).clone();
        let sql = self.target.dialect().select(&mut comp);
        (sql, comp.take_bound_args())
    }

    /// Render the DELETE this builder would run, without executing it.
    pub fn to_delete_sql(&self) -> (String, Vec<Value>) {
        let mut comp = (*self.comp).clone();
        let sql = self.target.dialect().delete(&mut comp);
        (sql, comp.take_bound_args())
    }

    // ==================== Terminals ====================

    /// First matching row, or [`OrmError::NotFound`].
    pub async fn first(mut self) -> OrmResult<Row> {
        if self.comp.limit.is_empty() {
            self.comp.limit = "1".to_string();
        }
        let table = self.comp.table.clone();
        self.all()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::not_found(format!("no rows in {table}")))
    }

    pub async fn first_as<T: FromRow>(self) -> OrmResult<T> {
        T::from_row(&self.first().await?)
    }

    /// Row whose `id` equals `id`.
    pub async fn find(self, id: impl Into<Value>) -> OrmResult<Row> {
        self.where_eq("id", id).first().await
    }

    /// All matching rows; possibly empty.
    pub async fn all(mut self) -> OrmResult<Vec<Row>> {
        let dialect = self.target.dialect();
        let sql = dialect.select(&mut self.comp);
        let args = self.comp.take_bound_args();
        self.target
            .query(&sql, &args, &self.settings.monitor)
            .await
    }

    pub async fn all_as<T: FromRow>(self) -> OrmResult<Vec<T>> {
        self.all().await?.iter().map(T::from_row).collect()
    }

    /// `SELECT count(*)` over the current conditions. ORDER BY is dropped.
    pub async fn count(mut self) -> OrmResult<i64> {
        self.comp.order.clear();
        let value = self.aggregate("count", "*").await?;
        value
            .as_i64()
            .ok_or_else(|| OrmError::decode("count", format!("expected integer, found {}", value.kind())))
    }

    pub async fn sum(self, field: &str) -> OrmResult<Value> {
        self.aggregate("sum", field).await
    }

    pub async fn max(self, field: &str) -> OrmResult<Value> {
        self.aggregate("max", field).await
    }

    pub async fn min(self, field: &str) -> OrmResult<Value> {
        self.aggregate("min", field).await
    }

    pub async fn avg(self, field: &str) -> OrmResult<Value> {
        self.aggregate("avg", field).await
    }

    async fn aggregate(mut self, function: &str, field: &str) -> OrmResult<Value> {
        self.comp.fields = vec![field.to_string()];
        self.comp.functions = vec![Some(function.to_string())];
        let rows = self.all().await?;
        Ok(rows
            .first()
            .and_then(Row::first_value)
            .cloned()
            .unwrap_or_default())
    }

    /// Insert `values` and return the generated key (0 when the engine reports none).
    ///
    /// On PostgreSQL, tables from [`Settings::returning_id_tables`] use
    /// `INSERT ... RETURNING id`. Outside a transaction, an engine that rejects
    /// `RETURNING` gets the plain insert followed by `SELECT max(id)`.
    pub async fn insert(mut self, values: Values) -> OrmResult<i64> {
        self.comp.values = values;
        let dialect = self.target.dialect();
        let sql = dialect.insert(&mut self.comp);
        let args = self.comp.take_bound_args();

        if dialect.kind() == DialectKind::Postgresql && self.settings.returns_id(&self.comp.table)
        {
            return self.insert_returning(&sql, &args).await;
        }

        let done = self
            .target
            .execute(&sql, &args, &self.settings.monitor)
            .await?;
        if done.rows_affected == 0 {
            return Err(OrmError::NoAffectedRows);
        }
        Ok(done.last_insert_id.unwrap_or(0))
    }

    async fn insert_returning(&self, sql: &str, args: &[Value]) -> OrmResult<i64> {
        let monitor = &self.settings.monitor;
        let returning = format!("{sql} RETURNING id");
        match self.target.query(&returning, args, monitor).await {
            Ok(rows) => first_id(&rows)
                .ok_or_else(|| OrmError::InsertFailed(format!("no id returned for {}", self.comp.table))),
            Err(err)
                if !self.target.in_transaction()
                    && err.to_string().contains(RETURNING_UNSUPPORTED) =>
            {
                tracing::debug!(
                    target: crate::monitor::SQL_TARGET,
                    table = %self.comp.table,
                    "RETURNING rejected, falling back to max(id)"
                );
                let done = self.target.execute(sql, args, monitor).await?;
                if done.rows_affected == 0 {
                    return Err(OrmError::NoAffectedRows);
                }
                let delims = self.delimiters();
                let max_sql = format!(
                    "SELECT max({}) AS id FROM {}",
                    quote_field("id", delims),
                    quote_table(&self.comp.table, delims)
                );
                let rows = self.target.query(&max_sql, &[], monitor).await?;
                first_id(&rows).ok_or_else(|| {
                    OrmError::InsertFailed(format!("max(id) empty for {}", self.comp.table))
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Update matching rows with `values` plus any [`Sql::update_raw`] expressions.
    /// Zero matched rows is [`OrmError::NoAffectedRows`].
    ///
    /// # Panics
    ///
    /// Panics when there is nothing to set.
    pub async fn update(mut self, values: Values) -> OrmResult<u64> {
        self.comp.values = values;
        let dialect = self.target.dialect();
        let sql = dialect.update(&mut self.comp);
        self.execute_counted(sql).await
    }

    /// Delete matching rows. Zero matched rows is [`OrmError::NoAffectedRows`].
    pub async fn delete(mut self) -> OrmResult<u64> {
        let dialect = self.target.dialect();
        let sql = dialect.delete(&mut self.comp);
        self.execute_counted(sql).await
    }

    /// Run an UPDATE made only of [`Sql::update_raw`] expressions.
    ///
    /// # Panics
    ///
    /// Panics when no raw expression was added.
    pub async fn exec(mut self) -> OrmResult<u64> {
        self.comp.values.clear();
        let dialect = self.target.dialect();
        let sql = dialect.update(&mut self.comp);
        self.execute_counted(sql).await
    }

    async fn execute_counted(mut self, sql: String) -> OrmResult<u64> {
        let args = self.comp.take_bound_args();
        let done = self
            .target
            .execute(&sql, &args, &self.settings.monitor)
            .await?;
        if done.rows_affected == 0 {
            return Err(OrmError::NoAffectedRows);
        }
        Ok(done.rows_affected)
    }

    /// Column metadata rows for the builder's table, in the engine's native shape.
    pub async fn show_columns(self) -> OrmResult<Vec<Row>> {
        let sql = self.target.dialect().show_columns(&self.comp.table);
        self.target.query(&sql, &[], &self.settings.monitor).await
    }

    /// Table names of the current database. SQLite's `sqlite_sequence` is skipped.
    pub async fn show_tables(self) -> OrmResult<Vec<String>> {
        let dialect = self.target.dialect();
        let rows = self
            .target
            .query(&dialect.show_tables(), &[], &self.settings.monitor)
            .await?;
        let column = dialect.table_name_column();
        Ok(rows
            .iter()
            .filter_map(|row| match column {
                Some(name) => row.get(name),
                None => row.first_value(),
            })
            .filter_map(|value| value.as_str().map(str::to_string))
            .filter(|name| name != SQLITE_SEQUENCE_TABLE)
            .collect())
    }

    /// Run `f` in a transaction on this builder's connection.
    pub async fn with_transaction<F, Fut, T>(self, f: F) -> OrmResult<T>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        self.with_transaction_by_level(TransactionIsolation::Default, f)
            .await
    }

    /// Run `f` in a transaction opened at `level`.
    ///
    /// # Panics
    ///
    /// Panics when the builder is already bound to a transaction.
    pub async fn with_transaction_by_level<F, Fut, T>(
        self,
        level: TransactionIsolation,
        f: F,
    ) -> OrmResult<T>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        match &self.target {
            Target::Connection { name, conn } => transaction::run(conn, name, level, f).await,
            Target::Transaction(_) => crate::fault("nested transactions are not supported"),
        }
    }
}

fn push_list(list: &mut String, item: &str) {
    if !list.is_empty() {
        list.push_str(", ");
    }
    list.push_str(item);
}

/// Whether `sql` has an `OR` keyword outside parentheses and quotes.
fn has_top_level_or(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'o' | b'O' if depth == 0 => {
                let word = bytes.get(i..i + 2).is_some_and(|w| w.eq_ignore_ascii_case(b"or"));
                let before = i == 0 || bytes[i - 1].is_ascii_whitespace();
                let after = bytes.get(i + 2).is_none_or(|c| c.is_ascii_whitespace() || *c == b'(');
                if word && before && after {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

fn first_id(rows: &[Row]) -> Option<i64> {
    rows.first()
        .and_then(|row| row.get("id").or_else(|| row.first_value()))
        .and_then(Value::as_i64)
}

#[cfg(test)]
mod tests;
