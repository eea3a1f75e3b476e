use super::{
    COLUMNS_KEY, FilterOperator, OPERATOR_SUFFIX, PAGE_KEY, PAGE_SIZE_KEY, PJAX_KEY, PREFIX_KEY,
    PRIMARY_KEY_KEY, SEPARATOR, SORT_KEY, SORT_TYPE_KEY,
};
use std::collections::BTreeMap;

const RESERVED_KEYS: [&str; 7] = [
    PAGE_KEY,
    PAGE_SIZE_KEY,
    SORT_KEY,
    SORT_TYPE_KEY,
    COLUMNS_KEY,
    PREFIX_KEY,
    PJAX_KEY,
];

const SORT_ASC: &str = "asc";
const SORT_DESC: &str = "desc";

/// Filter, sort and paging state of one list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    /// 1-based
    pub page: u64,
    pub page_size: u64,
    pub sort_field: String,
    /// `asc` or `desc`
    pub sort_type: String,
    /// Visible columns, in display order
    pub columns: Vec<String>,
    pub prefix: String,
    /// Filter key → values. Keys keep their reserved suffixes.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl Parameters {
    /// First page, sorted by `sort_field` descending, no filters.
    pub fn new(page_size: u64, sort_field: impl Into<String>) -> Self {
        Self {
            page: 1,
            page_size,
            sort_field: sort_field.into(),
            sort_type: SORT_DESC.to_string(),
            columns: Vec::new(),
            prefix: String::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Parse a URL query string (without the leading `?`).
    ///
    /// Missing or invalid paging falls back to page 1 and `default_page_size`; the sort
    /// field defaults to `primary_key`, the direction to `desc`.
    pub fn from_query(query: &str, default_page_size: u64, primary_key: &str) -> Self {
        let mut raw: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            raw.entry(key.into_owned()).or_default().push(value.into_owned());
        }
        let first = |key: &str| {
            raw.get(key)
                .and_then(|values| values.first())
                .map(String::as_str)
                .filter(|v| !v.is_empty())
        };

        let mut params = Self::new(default_page_size, primary_key);
        if let Some(page) = first(PAGE_KEY).and_then(|p| p.parse::<u64>().ok()) {
            params.page = page.max(1);
        }
        if let Some(size) = first(PAGE_SIZE_KEY).and_then(|p| p.parse::<u64>().ok()) {
            if size > 0 {
                params.page_size = size;
            }
        }
        if let Some(sort) = first(SORT_KEY) {
            params.sort_field = sort.to_string();
        }
        if let Some(direction) = first(SORT_TYPE_KEY) {
            if direction == SORT_ASC || direction == SORT_DESC {
                params.sort_type = direction.to_string();
            }
        }
        if let Some(columns) = first(COLUMNS_KEY) {
            params.columns = columns
                .split(',')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(prefix) = first(PREFIX_KEY) {
            params.prefix = prefix.to_string();
        }

        for (key, values) in &raw {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if values.first().is_none_or(|v| v.is_empty()) {
                continue;
            }
            // An operator means nothing without a value for its field.
            if key.contains(OPERATOR_SUFFIX) && first(&key.replace(OPERATOR_SUFFIX, "")).is_none() {
                continue;
            }
            let values: Vec<String> = values
                .iter()
                .flat_map(|v| v.split(SEPARATOR))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            if !values.is_empty() {
                params
                    .fields
                    .entry(key.replace("[]", ""))
                    .or_default()
                    .extend(values);
            }
        }
        params
    }

    /// Add one value to a filter key.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Match `value` against any of `columns`.
    pub fn with_or_condition<I, S>(self, columns: I, value: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = columns
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.with_field(key, value)
    }

    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, direction: &str) -> Self {
        self.sort_field = field.into();
        if direction == SORT_ASC || direction == SORT_DESC {
            self.sort_type = direction.to_string();
        }
        self
    }

    /// Row offset of the current page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Primary keys selected in the request (`__pk=1,2,3`).
    pub fn pks(&self) -> Vec<String> {
        self.field_value(PRIMARY_KEY_KEY)
            .map(|pks| {
                pks.split(',')
                    .filter(|pk| !pk.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn field_value(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn field_values(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// All values of a field joined with [`SEPARATOR`].
    pub fn field_values_str(&self, field: &str) -> String {
        self.field_values(field).join(SEPARATOR)
    }

    /// Operator for `field`; `index_suffix` selects a repeated condition.
    ///
    /// No operator key means equality. An unrecognized token is `None`.
    pub fn field_operator(&self, field: &str, index_suffix: &str) -> Option<FilterOperator> {
        match self.field_value(&format!("{field}{OPERATOR_SUFFIX}{index_suffix}")) {
            None => Some(FilterOperator::Equal),
            Some(token) => FilterOperator::from_token(token),
        }
    }

    pub fn is_ascending(&self) -> bool {
        self.sort_type == SORT_ASC
    }

    /// Whether any filter is set.
    pub fn has_filters(&self) -> bool {
        self.fields.keys().any(|k| k != PRIMARY_KEY_KEY)
    }

    /// Encode back into a query string: paging, sort, columns, prefix, then filters.
    pub fn to_query_string(&self) -> String {
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        out.append_pair(PAGE_KEY, &self.page.to_string())
            .append_pair(PAGE_SIZE_KEY, &self.page_size.to_string())
            .append_pair(SORT_KEY, &self.sort_field)
            .append_pair(SORT_TYPE_KEY, &self.sort_type);
        if !self.columns.is_empty() {
            out.append_pair(COLUMNS_KEY, &self.columns.join(","));
        }
        if !self.prefix.is_empty() {
            out.append_pair(PREFIX_KEY, &self.prefix);
        }
        for (key, values) in &self.fields {
            for value in values {
                out.append_pair(key, value);
            }
        }
        out.finish()
    }
}
