//! PostgreSQL driver: `tokio-postgres` over a `deadpool-postgres` pool.

use crate::config::DatabaseConfig;
use crate::connection::{Connection, ExecResult, Transaction};
use crate::dialect::{Dialect, DialectKind};
use crate::error::{OrmError, OrmResult};
use crate::monitor::SQL_TARGET;
use crate::row::Row;
use crate::types::{ColumnClass, ScanTarget};
use crate::value::Value;
use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{ClientWrapper, Object, Pool};
use rust_decimal::Decimal;
use std::error::Error;
use std::net::IpAddr;
use std::str::FromStr;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

type BoxError = Box<dyn Error + Sync + Send>;

/// Pooled PostgreSQL connection.
#[derive(Clone)]
pub struct PgConnection {
    pool: Pool,
    /// Idle clients kept after use; 0 keeps every one the pool can hold
    max_idle: usize,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("status", &self.pool.status())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

impl PgConnection {
    /// Build the pool from config. No connection is opened until first use.
    ///
    /// `max_open_conns` caps the pool and `max_idle_conns` caps how many clients stay
    /// open while unused.
    pub fn connect(config: &DatabaseConfig) -> OrmResult<Self> {
        Ok(Self {
            pool: crate::pool::create_pool_from_config(config)?,
            max_idle: config.max_idle_conns,
        })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool, max_idle: 0 }
    }

    /// Close clients on release once `max_idle` are already idle.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Hand a client back, closing it when the idle cap is already reached.
    fn release(&self, client: Object) {
        if exceeds_idle_cap(self.pool.status().available, self.max_idle) {
            drop(Object::take(client));
        }
    }
}

fn exceeds_idle_cap(available: usize, max_idle: usize) -> bool {
    max_idle > 0 && available >= max_idle
}

#[async_trait]
impl Connection for PgConnection {
    fn dialect(&self) -> &'static dyn Dialect {
        DialectKind::Postgresql.dialect()
    }

    async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        let client = self.pool.get().await?;
        let rows = fetch(&client, sql, args).await;
        self.release(client);
        rows
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        let client = self.pool.get().await?;
        let done = execute(&client, sql, args).await;
        self.release(client);
        done
    }

    async fn begin(&self, statements: &[String]) -> OrmResult<Box<dyn Transaction>> {
        let client = self.pool.get().await?;
        for statement in statements {
            client
                .batch_execute(statement)
                .await
                .map_err(OrmError::from_db_error)?;
        }
        Ok(Box::new(PgTransaction {
            client: Some(client),
        }))
    }
}

/// Transaction pinned to one pooled client.
///
/// Dropped without commit or rollback, it rolls back in a background task before the
/// client returns to the pool.
pub struct PgTransaction {
    client: Option<Object>,
}

impl PgTransaction {
    fn client(&self) -> OrmResult<&Object> {
        self.client.as_ref().ok_or(OrmError::TransactionFinished)
    }

    async fn finish(&mut self, statement: &str) -> OrmResult<()> {
        let client = self.client.take().ok_or(OrmError::TransactionFinished)?;
        client
            .batch_execute(statement)
            .await
            .map_err(OrmError::from_db_error)
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn query(&mut self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        fetch(self.client()?, sql, args).await
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        execute(self.client()?, sql, args).await
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        tracing::warn!(target: SQL_TARGET, "transaction dropped while open, rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        tracing::warn!(target: SQL_TARGET, error = %e, "rollback of dropped transaction failed");
                    }
                });
            }
            // No runtime to roll back on; discard the connection instead of returning it
            // to the pool mid-transaction.
            Err(_) => drop(Object::take(client)),
        }
    }
}

fn bind(args: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    args.iter().map(|a| a as &(dyn ToSql + Sync)).collect()
}

async fn fetch(client: &ClientWrapper, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
    let stmt = client
        .prepare_cached(sql)
        .await
        .map_err(OrmError::from_db_error)?;
    let rows = match client.query(&stmt, &bind(args)).await {
        Ok(rows) => rows,
        Err(e) if is_connection_failure(&e) => {
            crate::fault(format!("query failed after successful prepare: {e}"))
        }
        // Server rejections and parameters that cannot be encoded for the column.
        Err(e) => return Err(OrmError::from_db_error(e)),
    };
    let columns: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    rows.iter()
        .map(|row| decode_row(row, &columns))
        .collect()
}

/// The connection itself broke, as opposed to the statement or its arguments failing.
fn is_connection_failure(err: &tokio_postgres::Error) -> bool {
    err.is_closed() || err.source().is_some_and(|source| source.is::<std::io::Error>())
}

async fn execute(client: &ClientWrapper, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
    let stmt = client
        .prepare_cached(sql)
        .await
        .map_err(OrmError::from_db_error)?;
    let rows_affected = client
        .execute(&stmt, &bind(args))
        .await
        .map_err(OrmError::from_db_error)?;
    Ok(ExecResult {
        rows_affected,
        last_insert_id: None,
    })
}

fn decode_row(row: &tokio_postgres::Row, columns: &[String]) -> OrmResult<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let target = scan(row, idx, column.type_())
            .map_err(|e| OrmError::decode(column.name(), e.to_string()))?;
        values.push(target.into_value());
    }
    Ok(Row::new(columns.to_vec(), values))
}

/// Any column, as the raw wire bytes.
struct RawValue(Vec<u8>);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(RawValue(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn raw(row: &tokio_postgres::Row, idx: usize) -> Result<Value, tokio_postgres::Error> {
    Ok(row
        .try_get::<_, Option<RawValue>>(idx)?
        .map_or(Value::Null, |r| Value::Bytes(r.0)))
}

/// `money` travels as big-endian cents.
fn money_text(raw: Vec<u8>) -> Vec<u8> {
    let Ok(cents) = <[u8; 8]>::try_from(raw.as_slice()) else {
        return raw;
    };
    let cents = i64::from_be_bytes(cents);
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}{}.{:02}", (cents / 100).abs(), (cents % 100).abs()).into_bytes()
}

fn scan(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Result<ScanTarget, tokio_postgres::Error> {
    let target = match ColumnClass::of(ty.name()) {
        ColumnClass::Bool => ScanTarget::Bool(row.try_get(idx)?),
        ColumnClass::Int => match *ty {
            Type::INT2 => ScanTarget::Int(row.try_get::<_, Option<i16>>(idx)?.map(i64::from)),
            Type::INT4 => ScanTarget::Int(row.try_get::<_, Option<i32>>(idx)?.map(i64::from)),
            _ => ScanTarget::Int(row.try_get::<_, Option<i64>>(idx)?),
        },
        ColumnClass::Float => match *ty {
            Type::FLOAT4 => ScanTarget::Float(row.try_get::<_, Option<f32>>(idx)?.map(f64::from)),
            _ => ScanTarget::Float(row.try_get::<_, Option<f64>>(idx)?),
        },
        ColumnClass::Unsigned => match *ty {
            Type::NUMERIC => ScanTarget::Unsigned(
                row.try_get::<_, Option<Decimal>>(idx)?
                    .map(|d| d.to_string().into_bytes()),
            ),
            Type::MONEY => ScanTarget::Unsigned(
                row.try_get::<_, Option<RawValue>>(idx)?
                    .map(|r| money_text(r.0)),
            ),
            _ => ScanTarget::Unsigned(row.try_get::<_, Option<RawValue>>(idx)?.map(|r| r.0)),
        },
        ColumnClass::Text => match *ty {
            Type::TIMESTAMP => ScanTarget::Text(
                row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
            Type::TIMESTAMPTZ => ScanTarget::Text(
                row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
            Type::DATE => ScanTarget::Text(
                row.try_get::<_, Option<chrono::NaiveDate>>(idx)?
                    .map(|d| d.format("%Y-%m-%d").to_string()),
            ),
            Type::TIME => ScanTarget::Text(
                row.try_get::<_, Option<chrono::NaiveTime>>(idx)?
                    .map(|t| t.format("%H:%M:%S").to_string()),
            ),
            Type::JSON | Type::JSONB => ScanTarget::Text(
                row.try_get::<_, Option<serde_json::Value>>(idx)?
                    .map(|j| j.to_string()),
            ),
            Type::UUID => ScanTarget::Text(
                row.try_get::<_, Option<uuid::Uuid>>(idx)?
                    .map(|u| u.to_string()),
            ),
            Type::INET => ScanTarget::Text(
                row.try_get::<_, Option<IpAddr>>(idx)?
                    .map(|ip| ip.to_string()),
            ),
            Type::BYTEA => ScanTarget::Dynamic(raw(row, idx)?),
            _ if <String as FromSql>::accepts(ty) => ScanTarget::Text(row.try_get(idx)?),
            _ => ScanTarget::Dynamic(raw(row, idx)?),
        },
        ColumnClass::Dynamic => {
            if <String as FromSql>::accepts(ty) {
                ScanTarget::Dynamic(
                    row.try_get::<_, Option<String>>(idx)?
                        .map_or(Value::Null, Value::Text),
                )
            } else {
                ScanTarget::Dynamic(raw(row, idx)?)
            }
        }
    };
    Ok(target)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => int_param(i64::from(*b), ty, out),
            },
            Value::Int(i) => int_param(*i, ty, out),
            Value::Float(f) => match *ty {
                Type::FLOAT8 => f.to_sql(ty, out),
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
                _ => text_param(&f.to_string(), ty, out),
            },
            Value::Text(s) => text_param(s, ty, out),
            Value::Bytes(b) => match *ty {
                Type::BYTEA => b.as_slice().to_sql(ty, out),
                _ => text_param(std::str::from_utf8(b)?, ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn int_param(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ => text_param(&i.to_string(), ty, out),
    }
}

/// Bind request text to whatever parameter type the server inferred.
fn text_param(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let s = s.trim_end_matches('\0');
    match *ty {
        Type::BOOL => parse_bool(s)?.to_sql(ty, out),
        Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_str(s.trim())?.to_sql(ty, out),
        Type::DATE => parse_date(s)?.to_sql(ty, out),
        Type::TIME => chrono::NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")?.to_sql(ty, out),
        Type::TIMESTAMP => parse_datetime(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => match chrono::DateTime::parse_from_rfc3339(s.trim()) {
            Ok(t) => t.with_timezone(&chrono::Utc).to_sql(ty, out),
            Err(_) => parse_datetime(s)?.and_utc().to_sql(ty, out),
        },
        Type::UUID => uuid::Uuid::parse_str(s.trim())?.to_sql(ty, out),
        Type::JSON | Type::JSONB => {
            let json = serde_json::from_str::<serde_json::Value>(s)
                .unwrap_or_else(|_| serde_json::Value::String(s.to_string()));
            json.to_sql(ty, out)
        }
        Type::INET => IpAddr::from_str(s.trim())?.to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        _ if <&str as ToSql>::accepts(ty) => s.to_sql(ty, out),
        _ => Err(format!("cannot bind text value to parameter of type {ty}").into()),
    }
}

fn parse_bool(s: &str) -> Result<bool, BoxError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Ok(false),
        other => Err(format!("invalid boolean `{other}`").into()),
    }
}

fn parse_date(s: &str) -> Result<chrono::NaiveDate, BoxError> {
    let s = s.trim();
    let day = s.get(..10).unwrap_or(s);
    Ok(chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d")?)
}

fn parse_datetime(s: &str) -> Result<chrono::NaiveDateTime, BoxError> {
    let s = s.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = chrono::NaiveDateTime::parse_from_str(s, format) {
            return Ok(t);
        }
    }
    Ok(parse_date(s)?.and_time(chrono::NaiveTime::MIN))
}
