//! Request filters.
//!
//! Admin list pages describe their filters as query-string keys. [`Parameters`] parses
//! them, and [`Parameters::compile`] turns them into a WHERE fragment plus positional
//! arguments that [`Sql::apply_where`](crate::Sql::apply_where) feeds into a builder.
//!
//! Reserved key shapes, for a column `price`:
//!
//! | key | condition |
//! |---|---|
//! | `price=3` | `price = ?` (or the operator from `price__goadmin_operator__`) |
//! | `price=3&price=4` | `price IN (?, ?)` |
//! | `price_start__goadmin=3` | `price >= ?` |
//! | `price_end__goadmin=9` | `price <= ?` |
//! | `price__goadmin_index__1=3` | another condition on `price`, operator from `price__goadmin_operator____goadmin_index__1` |
//! | `role_goadmin_join_name=x` | `role.name = ?` on a joined table |
//! | `name,email=%ann%` | `(name LIKE ? OR email LIKE ?)` |

mod compiler;
mod parameters;
mod wheres;

pub use parameters::Parameters;
pub use wheres::{RawWhere, StaticWhere, WhereJoin, WhereState};

/// Range lower bound suffix.
pub const RANGE_START_SUFFIX: &str = "_start__goadmin";
/// Range upper bound suffix.
pub const RANGE_END_SUFFIX: &str = "_end__goadmin";
/// Infix between a joined table's alias and its column.
pub const JOIN_INFIX: &str = "_goadmin_join_";
/// Suffix of the key carrying a field's operator token.
pub const OPERATOR_SUFFIX: &str = "__goadmin_operator__";
/// Infix marking a repeated condition on one field.
pub const INDEX_INFIX: &str = "__goadmin_index__";
/// Joins a multi-value field into one string.
pub const SEPARATOR: &str = "__goadmin_separator__";

pub const PAGE_KEY: &str = "__page";
pub const PAGE_SIZE_KEY: &str = "__pageSize";
pub const SORT_KEY: &str = "__sort";
pub const SORT_TYPE_KEY: &str = "__sort_type";
pub const COLUMNS_KEY: &str = "__columns";
pub const PREFIX_KEY: &str = "__prefix";
pub const PRIMARY_KEY_KEY: &str = "__pk";
pub const PJAX_KEY: &str = "_pjax";

/// Comparison selected by an operator token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Like,
    /// `gr`
    Greater,
    /// `gq`
    GreaterOrEqual,
    /// `eq`
    Equal,
    /// `ne`
    NotEqual,
    /// `le`
    Less,
    /// `lq`
    LessOrEqual,
    /// Caller-composed; no clause is generated
    Free,
}

impl FilterOperator {
    /// Parse a token. Tokens are case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "like" => Self::Like,
            "gr" => Self::Greater,
            "gq" => Self::GreaterOrEqual,
            "eq" => Self::Equal,
            "ne" => Self::NotEqual,
            "le" => Self::Less,
            "lq" => Self::LessOrEqual,
            "free" => Self::Free,
            _ => return None,
        })
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Greater => "gr",
            Self::GreaterOrEqual => "gq",
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::Less => "le",
            Self::LessOrEqual => "lq",
            Self::Free => "free",
        }
    }

    /// SQL operator; `None` for [`FilterOperator::Free`].
    pub fn as_sql(self) -> Option<&'static str> {
        match self {
            Self::Like => Some("LIKE"),
            Self::Greater => Some(">"),
            Self::GreaterOrEqual => Some(">="),
            Self::Equal => Some("="),
            Self::NotEqual => Some("!="),
            Self::Less => Some("<"),
            Self::LessOrEqual => Some("<="),
            Self::Free => None,
        }
    }
}
