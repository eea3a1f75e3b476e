//! Connection configuration.
//!
//! ```toml
//! [default]
//! driver = "postgresql"
//! host = "127.0.0.1"
//! port = "5432"
//! user = "admin"
//! pwd = "${ADMIN_DB_PASSWORD}"
//! name = "admin"
//! max_open_conns = 16
//!
//! [audit]
//! driver = "sqlite"
//! file = "./audit.db"
//! ```

use crate::database::DEFAULT_CONNECTION;
use crate::dialect::DialectKind;
use crate::error::{OrmError, OrmResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One logical connection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `mysql`, `postgresql`, `mssql` or `sqlite`
    pub driver: String,
    pub host: String,
    pub port: String,
    pub user: String,
    pub pwd: String,
    /// Database name
    pub name: String,
    /// SQLite database path; `:memory:` for an in-memory database
    pub file: String,
    /// Full connection string; overrides the individual fields
    pub dsn: String,
    /// Clients kept open while unused; extra ones are closed on release. 0 means no cap
    pub max_idle_conns: usize,
    pub max_open_conns: usize,
    /// How long a statement waits for a free connection
    pub wait_timeout_ms: Option<u64>,
    pub slow_query_ms: Option<u64>,
    /// Extra DSN query parameters
    pub params: BTreeMap<String, String>,
}

impl DatabaseConfig {
    pub fn dialect(&self) -> OrmResult<DialectKind> {
        self.driver.parse()
    }

    /// Pool size; `max_open_conns`, or 16 when unset.
    pub fn pool_size(&self) -> usize {
        if self.max_open_conns == 0 {
            16
        } else {
            self.max_open_conns
        }
    }

    /// Driver connection string, built from the fields when `dsn` is empty.
    pub fn dsn(&self) -> OrmResult<String> {
        if !self.dsn.is_empty() {
            return Ok(self.dsn.clone());
        }
        let dsn = match self.dialect()? {
            DialectKind::Mysql => {
                let mut dsn = format!(
                    "{}:{}@tcp({}:{})/{}",
                    self.user,
                    self.pwd,
                    self.host,
                    or_default(&self.port, "3306"),
                    self.name
                );
                let mut params = self.params.clone();
                params
                    .entry("charset".to_string())
                    .or_insert_with(|| "utf8mb4".to_string());
                dsn.push('?');
                dsn.push_str(&encode_params(&params));
                dsn
            }
            DialectKind::Postgresql => {
                let mut url = url::Url::parse("postgres://localhost")
                    .map_err(|e| OrmError::config(e.to_string()))?;
                url.set_host(Some(or_default(&self.host, "127.0.0.1")))
                    .map_err(|e| OrmError::config(format!("invalid host: {e}")))?;
                let port: u16 = or_default(&self.port, "5432")
                    .parse()
                    .map_err(|_| OrmError::config(format!("invalid port `{}`", self.port)))?;
                let _ = url.set_port(Some(port));
                if !self.user.is_empty() {
                    let _ = url.set_username(&self.user);
                }
                if !self.pwd.is_empty() {
                    let _ = url.set_password(Some(&self.pwd));
                }
                url.set_path(&self.name);
                let mut params = self.params.clone();
                params
                    .entry("sslmode".to_string())
                    .or_insert_with(|| "disable".to_string());
                url.query_pairs_mut().extend_pairs(params.iter());
                url.to_string()
            }
            DialectKind::Mssql => {
                let mut dsn = format!(
                    "sqlserver://{}:{}@{}:{}?database={}",
                    self.user,
                    self.pwd,
                    self.host,
                    or_default(&self.port, "1433"),
                    self.name
                );
                if !self.params.is_empty() {
                    dsn.push('&');
                    dsn.push_str(&encode_params(&self.params));
                }
                dsn
            }
            DialectKind::Sqlite => {
                if self.file.is_empty() {
                    return Err(OrmError::config("sqlite connection needs `file`"));
                }
                self.file.clone()
            }
        };
        Ok(dsn)
    }

    fn expand_env(&mut self) -> OrmResult<()> {
        for field in [
            &mut self.driver,
            &mut self.host,
            &mut self.port,
            &mut self.user,
            &mut self.pwd,
            &mut self.name,
            &mut self.file,
            &mut self.dsn,
        ] {
            *field = expand_env_vars(field)?;
        }
        for v in self.params.values_mut() {
            *v = expand_env_vars(v)?;
        }
        Ok(())
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

fn encode_params(params: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

/// Named connections; the `default` entry backs [`Database::table`](crate::Database::table).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct DatabaseList(BTreeMap<String, DatabaseConfig>);

impl DatabaseList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, config: DatabaseConfig) -> Self {
        self.0.insert(name.into(), config);
        self
    }

    /// Parse TOML text, expand `${VAR}` references and validate.
    pub fn from_toml(raw: &str) -> OrmResult<Self> {
        let mut list: DatabaseList =
            toml::from_str(raw).map_err(|e| OrmError::config(format!("invalid config: {e}")))?;
        for config in list.0.values_mut() {
            config.expand_env()?;
        }
        list.validate()?;
        Ok(list)
    }

    pub fn from_file(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrmError::config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseConfig> {
        self.0.get(name)
    }

    pub fn default_config(&self) -> Option<&DatabaseConfig> {
        self.get(DEFAULT_CONNECTION)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DatabaseConfig)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.default_config().is_none() {
            return Err(OrmError::config("a `default` connection is required"));
        }
        for (name, config) in &self.0 {
            config
                .dialect()
                .map_err(|e| OrmError::config(format!("connection `{name}`: {e}")))?;
            if config.max_idle_conns > config.pool_size() {
                return Err(OrmError::config(format!(
                    "connection `{name}`: max_idle_conns exceeds max_open_conns"
                )));
            }
        }
        Ok(())
    }
}

fn expand_env_vars(input: &str) -> OrmResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                return Err(OrmError::config(format!(
                    "unterminated env var reference: ${{{key}}}"
                )));
            }
            if key.is_empty() {
                return Err(OrmError::config("invalid env var reference: ${}"));
            }

            let v = std::env::var(&key).map_err(|_| {
                OrmError::config(format!("missing env var for config expansion: {key}"))
            })?;
            out.push_str(&v);
            continue;
        }

        out.push(c);
    }

    Ok(out)
}
