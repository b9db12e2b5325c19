//! Query engine types.
//!
//! Provides the canonical query description shared by every repository:
//! - QueryParams: validated filters, options, projection and search token
//! - QueryOptions: pagination and sort
//! - QueryResult: items plus the total/filter count split
//! - FieldKind: declared comparison type of an allow-listed field

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::filter::Predicate;

/// Default page size when the caller does not ask for one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Ceiling applied when a schema does not configure its own.
pub const DEFAULT_MAX_LIMIT: u32 = 100;

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse a user-supplied direction.
    ///
    /// Accepts `asc`/`desc`, `ascending`/`descending` (any case) and the
    /// numeric forms `1`/`-1`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Some(Self::Asc),
            "desc" | "descending" | "-1" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared comparison type of a field.
///
/// Drives operand coercion in the filter compiler and casts in the SQL
/// backend. Fields without a declaration are `Any`: operands keep the JSON
/// type they arrived with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Any,
    Text,
    Number,
    Boolean,
    Date,
}

/// Pagination and sort options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Page size, already clamped to the schema's maximum.
    pub limit: Option<u32>,

    /// 1-indexed page number.
    pub page: Option<u32>,

    /// Allow-listed field to sort by.
    pub sort_field: Option<String>,

    /// Sort direction; ascending when absent.
    pub sort_dir: Option<SortDirection>,
}

/// Canonical, validated query description.
///
/// Produced by [`QuerySchema::validate`](super::QuerySchema::validate) and
/// consumed as-is by the compiler. Nothing downstream re-validates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Field name to predicate. Keys are filterable fields.
    #[serde(default)]
    pub filters: BTreeMap<String, Predicate>,

    /// Pagination and sort.
    #[serde(default)]
    pub options: QueryOptions,

    /// Ordered projection; empty means every stored field.
    #[serde(default)]
    pub fields: Vec<String>,

    /// Free-text token matched against the schema's searchable fields.
    #[serde(default)]
    pub search: Option<String>,
}

impl QueryParams {
    /// Page number, defaulting to the first page.
    pub fn page(&self) -> u32 {
        self.options.page.unwrap_or(1)
    }

    /// Page size, defaulting to [`DEFAULT_LIMIT`].
    pub fn limit(&self) -> u32 {
        self.options.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Sort direction, defaulting to ascending.
    pub fn sort_dir(&self) -> SortDirection {
        self.options.sort_dir.unwrap_or_default()
    }
}

/// Result of a paginated query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult<T> {
    /// Items on the requested page, in sort order.
    pub items: Vec<T>,

    /// Size of the whole collection, ignoring filters.
    pub total_count: u64,

    /// Number of entities matching the applied filter.
    pub filter_count: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn sort_direction_parsing() {
        assert_eq!(SortDirection::parse("asc"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Desc));
        assert_eq!(
            SortDirection::parse("Descending"),
            Some(SortDirection::Desc)
        );
        assert_eq!(SortDirection::parse("-1"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("sideways"), None);
    }

    #[test]
    fn query_params_defaults() {
        let params = QueryParams::default();
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), DEFAULT_LIMIT);
        assert_eq!(params.sort_dir(), SortDirection::Asc);
        assert!(params.filters.is_empty());
    }

    #[test]
    fn query_result_serializes_camel_case() {
        let result = QueryResult {
            items: vec![1, 2],
            total_count: 5,
            filter_count: 2,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["totalCount"], 5);
        assert_eq!(json["filterCount"], 2);
    }
}
