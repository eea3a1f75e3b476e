//! Column type registry and scan targets.
//!
//! A column's declared type name picks a [`ColumnClass`], the class picks the nullable
//! [`ScanTarget`] a driver reads the cell into, and [`ScanTarget::into_value`] turns the
//! scanned cell into a normalized [`Value`].

use crate::value::Value;
use std::sync::OnceLock;

/// Coarse class of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    Bool,
    Int,
    Float,
    /// Unsigned, decimal and bit columns; kept as the driver's raw bytes
    Unsigned,
    /// Character and date/time columns
    Text,
    /// Anything outside the registry; the driver's native value passes through
    Dynamic,
}

const BOOL_TYPES: &[&str] = &["BOOL", "BOOLEAN"];

const INT_TYPES: &[&str] = &[
    "INT4",
    "INT2",
    "INT8",
    "INT",
    "TINYINT",
    "MEDIUMINT",
    "SMALLINT",
    "SMALLSERIAL",
    "SERIAL",
    "BIGSERIAL",
    "INTEGER",
    "BIGINT",
];

const FLOAT_TYPES: &[&str] = &[
    "FLOAT",
    "FLOAT4",
    "FLOAT8",
    "DOUBLE",
    "REAL",
    "DOUBLE PRECISION",
];

const UNSIGNED_TYPES: &[&str] = &["DECIMAL", "BIT", "MONEY", "NUMERIC"];

const TEXT_TYPES: &[&str] = &[
    "DATE",
    "TIME",
    "YEAR",
    "DATETIME",
    "TIMESTAMPTZ",
    "TIMESTAMP",
    "TIMETZ",
    "VARCHAR",
    "CHAR",
    "MEDIUMTEXT",
    "LONGTEXT",
    "TINYTEXT",
    "TEXT",
    "JSON",
    "JSONB",
    "BLOB",
    "TINYBLOB",
    "MEDIUMBLOB",
    "LONGBLOB",
    "INTERVAL",
    "POINT",
    "BPCHAR",
    "LINE",
    "LSEG",
    "BOX",
    "PATH",
    "POLYGON",
    "CIRCLE",
    "CIDR",
    "INET",
    "MACADDR",
    "CHARACTER",
    "VARYING CHARACTER",
    "CHARACTER VARYING",
    "NCHAR",
    "NATIVE CHARACTER",
    "NVARCHAR",
    "CLOB",
    "BINARY",
    "VARBINARY",
    "ENUM",
    "SET",
    "GEOMETRY",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "LINESTRING",
    "MULTIPOINT",
    "GEOMETRYCOLLECTION",
    "NAME",
    "UUID",
];

/// Normalize a declared type name: drop `(size)`/`(p,s)`, drop `unsigned`, uppercase.
///
/// `"int(11) unsigned"` → `"INT"`, `"character varying(255)"` → `"CHARACTER VARYING"`.
pub fn normalize_type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    for ch in name.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace()
        .filter(|word| !word.eq_ignore_ascii_case("unsigned"))
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

impl ColumnClass {
    /// Classify a declared (possibly un-normalized) type name.
    pub fn of(type_name: &str) -> Self {
        let normalized = normalize_type_name(type_name);
        let name = normalized.as_str();
        if BOOL_TYPES.contains(&name) {
            ColumnClass::Bool
        } else if INT_TYPES.contains(&name) {
            ColumnClass::Int
        } else if FLOAT_TYPES.contains(&name) {
            ColumnClass::Float
        } else if UNSIGNED_TYPES.contains(&name) {
            ColumnClass::Unsigned
        } else if TEXT_TYPES.contains(&name) {
            ColumnClass::Text
        } else {
            ColumnClass::Dynamic
        }
    }
}

/// Nullable per-class buffer a driver scans one cell into.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanTarget {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Unsigned(Option<Vec<u8>>),
    Text(Option<String>),
    Dynamic(Value),
}

impl ScanTarget {
    /// Empty (NULL) target for a class.
    pub fn empty(class: ColumnClass) -> Self {
        match class {
            ColumnClass::Bool => ScanTarget::Bool(None),
            ColumnClass::Int => ScanTarget::Int(None),
            ColumnClass::Float => ScanTarget::Float(None),
            ColumnClass::Unsigned => ScanTarget::Unsigned(None),
            ColumnClass::Text => ScanTarget::Text(None),
            ColumnClass::Dynamic => ScanTarget::Dynamic(Value::Null),
        }
    }

    pub fn class(&self) -> ColumnClass {
        match self {
            ScanTarget::Bool(_) => ColumnClass::Bool,
            ScanTarget::Int(_) => ColumnClass::Int,
            ScanTarget::Float(_) => ColumnClass::Float,
            ScanTarget::Unsigned(_) => ColumnClass::Unsigned,
            ScanTarget::Text(_) => ColumnClass::Text,
            ScanTarget::Dynamic(_) => ColumnClass::Dynamic,
        }
    }

    /// Convert the scanned cell into its normalized value.
    pub fn into_value(self) -> Value {
        match self {
            ScanTarget::Bool(v) => v.map_or(Value::Null, Value::Bool),
            ScanTarget::Int(v) => v.map_or(Value::Null, Value::Int),
            ScanTarget::Float(v) => v.map_or(Value::Null, Value::Float),
            ScanTarget::Unsigned(v) => v.map_or(Value::Null, Value::Bytes),
            ScanTarget::Text(v) => v.map_or(Value::Null, |s| Value::Text(normalize_datetime(&s))),
            ScanTarget::Dynamic(Value::Text(s)) => Value::Text(normalize_datetime(&s)),
            ScanTarget::Dynamic(v) => v,
        }
    }
}

fn iso_datetime_regex() -> &'static regex::Regex {
    static ISO_RE: OnceLock<regex::Regex> = OnceLock::new();
    ISO_RE.get_or_init(|| {
        regex::Regex::new(
            r"^(\d{4}-\d{2}-\d{2})T(\d{2}:\d{2}:\d{2})(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?$",
        )
        .expect("invalid built-in datetime regex")
    })
}

/// Rewrite an ISO-8601 timestamp to `YYYY-MM-DD HH:MM:SS`; other strings pass through.
pub fn normalize_datetime(s: &str) -> String {
    match iso_datetime_regex().captures(s) {
        Some(caps) => format!("{} {}", &caps[1], &caps[2]),
        None => s.to_string(),
    }
}
