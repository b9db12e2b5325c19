//! Query schema validation.
//!
//! A [`QuerySchema`] holds one entity's allow-list and query configuration.
//! It is built once at startup and turns an untyped raw query object into
//! canonical [`QueryParams`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::{Map, Value};

use super::error::QueryError;
use super::filter::Predicate;
use super::types::{
    DEFAULT_LIMIT, DEFAULT_MAX_LIMIT, FieldKind, QueryOptions, QueryParams, SortDirection,
};

/// Keys accepted inside a nested `options` object.
const OPTION_KEYS: &[&str] = &["limit", "page", "sortField", "sort_by", "sortDir", "sort_dir"];

/// Per-entity query configuration.
#[derive(Debug, Clone)]
pub struct QuerySchemaConfig {
    /// Ceiling for the requested page size.
    pub max_limit: u32,
    /// Fields usable in filters; the whole allow-list when `None`.
    pub filterable_fields: Option<Vec<String>>,
    /// Fields usable for sorting; the whole allow-list when `None`.
    pub sortable_fields: Option<Vec<String>>,
    /// Fields the free-text `search` token is matched against.
    pub searchable_fields: Vec<String>,
    pub date_fields: Vec<String>,
    pub numeric_fields: Vec<String>,
    pub boolean_fields: Vec<String>,
    /// Reject unrecognized top-level keys.
    pub strict: bool,
}

impl Default for QuerySchemaConfig {
    fn default() -> Self {
        Self {
            max_limit: DEFAULT_MAX_LIMIT,
            filterable_fields: None,
            sortable_fields: None,
            searchable_fields: Vec::new(),
            date_fields: Vec::new(),
            numeric_fields: Vec::new(),
            boolean_fields: Vec::new(),
            strict: false,
        }
    }
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| (*f).to_string()).collect()
}

impl QuerySchemaConfig {
    pub fn max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn filterable(mut self, fields: &[&str]) -> Self {
        self.filterable_fields = Some(owned(fields));
        self
    }

    pub fn sortable(mut self, fields: &[&str]) -> Self {
        self.sortable_fields = Some(owned(fields));
        self
    }

    pub fn searchable(mut self, fields: &[&str]) -> Self {
        self.searchable_fields = owned(fields);
        self
    }

    pub fn dates(mut self, fields: &[&str]) -> Self {
        self.date_fields = owned(fields);
        self
    }

    pub fn numbers(mut self, fields: &[&str]) -> Self {
        self.numeric_fields = owned(fields);
        self
    }

    pub fn booleans(mut self, fields: &[&str]) -> Self {
        self.boolean_fields = owned(fields);
        self
    }
}

/// Immutable allow-list plus configuration for one entity.
#[derive(Debug, Clone)]
pub struct QuerySchema {
    allow_list: Vec<String>,
    filterable: BTreeSet<String>,
    sortable: BTreeSet<String>,
    searchable: Vec<String>,
    kinds: HashMap<String, FieldKind>,
    max_limit: u32,
    strict: bool,
}

impl QuerySchema {
    /// Build a schema, checking every configured subset against the
    /// allow-list.
    pub fn new<I, S>(allow_list: I, config: QuerySchemaConfig) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allow: Vec<String> = Vec::new();
        for field in allow_list {
            let field = field.into();
            if !allow.contains(&field) {
                allow.push(field);
            }
        }
        if allow.is_empty() {
            return Err(QueryError::InvalidSchema("allow-list is empty".into()));
        }
        if config.max_limit == 0 {
            return Err(QueryError::InvalidSchema("max_limit must be positive".into()));
        }

        let subset = |name: &str, fields: &[String]| -> Result<(), QueryError> {
            match fields.iter().find(|&f| !allow.contains(f)) {
                Some(f) => Err(QueryError::InvalidSchema(format!(
                    "{name} field '{f}' is not in the allow-list"
                ))),
                None => Ok(()),
            }
        };

        let filterable = config.filterable_fields.unwrap_or_else(|| allow.clone());
        let sortable = config.sortable_fields.unwrap_or_else(|| allow.clone());
        subset("filterable", &filterable)?;
        subset("sortable", &sortable)?;
        subset("searchable", &config.searchable_fields)?;
        subset("date", &config.date_fields)?;
        subset("numeric", &config.numeric_fields)?;
        subset("boolean", &config.boolean_fields)?;

        let mut kinds = HashMap::new();
        for (fields, kind) in [
            (&config.date_fields, FieldKind::Date),
            (&config.numeric_fields, FieldKind::Number),
            (&config.boolean_fields, FieldKind::Boolean),
        ] {
            for field in fields {
                if kinds.insert(field.clone(), kind).is_some() {
                    return Err(QueryError::InvalidSchema(format!(
                        "field '{field}' declared with more than one type"
                    )));
                }
            }
        }
        for field in &config.searchable_fields {
            kinds.entry(field.clone()).or_insert(FieldKind::Text);
        }

        Ok(Self {
            allow_list: allow,
            filterable: filterable.into_iter().collect(),
            sortable: sortable.into_iter().collect(),
            searchable: config.searchable_fields,
            kinds,
            max_limit: config.max_limit,
            strict: config.strict,
        })
    }

    pub fn searchable_fields(&self) -> &[String] {
        &self.searchable
    }

    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Declared comparison type; `Any` for undeclared fields.
    pub fn field_kind(&self, field: &str) -> FieldKind {
        self.kinds.get(field).copied().unwrap_or_default()
    }

    /// Validate a raw query object into canonical parameters.
    ///
    /// `null` is treated as an empty query.
    pub fn validate(&self, raw: &Value) -> Result<QueryParams, QueryError> {
        let empty = Map::new();
        let map = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(QueryError::NotAnObject),
        };

        let mut options = RawOptions::default();
        let mut fields = Vec::new();
        let mut search = None;
        let mut explicit_filters = None;
        let mut shortcut_filters = BTreeMap::new();

        for (key, value) in map {
            match key.as_str() {
                "fields" => fields = self.parse_fields(value)?,
                "search" => search = parse_search(value)?,
                "filters" => explicit_filters = Some(self.parse_filters(value)?),
                "options" => {
                    let Value::Object(nested) = value else {
                        return Err(QueryError::InvalidFilterValue {
                            field: "options".into(),
                            reason: "expected an object".into(),
                        });
                    };
                    for (key, value) in nested {
                        if OPTION_KEYS.contains(&key.as_str()) {
                            options.set(key, value)?;
                        } else if self.strict {
                            return Err(QueryError::UnknownParameter {
                                key: format!("options.{key}"),
                            });
                        }
                    }
                }
                k if OPTION_KEYS.contains(&k) => options.set(k, value)?,
                _ if self.strict => {
                    return Err(QueryError::UnknownParameter { key: key.clone() });
                }
                _ => {
                    let matched = self
                        .filterable
                        .iter()
                        .find(|f| f.eq_ignore_ascii_case(key));
                    if let Some(field) = matched {
                        shortcut_filters.insert(field.clone(), Predicate::from_json(field, value)?);
                    }
                }
            }
        }

        let mut filters = shortcut_filters;
        if let Some(explicit) = explicit_filters {
            filters.extend(explicit);
        }

        Ok(QueryParams {
            filters,
            options: self.resolve_options(options)?,
            fields,
            search,
        })
    }

    fn resolve_options(&self, raw: RawOptions) -> Result<QueryOptions, QueryError> {
        let limit = match raw.limit {
            Some(v) => {
                let n = parse_integer(&v).ok_or_else(|| QueryError::InvalidLimit(plain(&v)))?;
                n.clamp(1, i64::from(self.max_limit)) as u32
            }
            None => DEFAULT_LIMIT.min(self.max_limit),
        };

        let page = match raw.page {
            Some(v) => match parse_integer(&v) {
                Some(n) if n >= 1 => {
                    u32::try_from(n).map_err(|_| QueryError::InvalidPage(plain(&v)))?
                }
                _ => return Err(QueryError::InvalidPage(plain(&v))),
            },
            None => 1,
        };

        let sort_field = match raw.sort_field {
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => {
                let s = s.trim();
                if !self.sortable.contains(s) {
                    return Err(QueryError::UnknownField {
                        field: s.to_string(),
                        context: "sort",
                    });
                }
                Some(s.to_string())
            }
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(QueryError::UnknownField {
                    field: other.to_string(),
                    context: "sort",
                });
            }
        };

        let sort_dir = match raw.sort_dir {
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => {
                Some(SortDirection::parse(&s).ok_or(QueryError::InvalidSortDirection(s))?)
            }
            Some(Value::Number(n)) => {
                let s = n.to_string();
                Some(SortDirection::parse(&s).ok_or(QueryError::InvalidSortDirection(s))?)
            }
            Some(Value::Null) | None => None,
            Some(other) => return Err(QueryError::InvalidSortDirection(other.to_string())),
        };

        Ok(QueryOptions {
            limit: Some(limit),
            page: Some(page),
            sort_field,
            sort_dir,
        })
    }

    fn parse_fields(&self, value: &Value) -> Result<Vec<String>, QueryError> {
        let raw: Vec<String> = match value {
            Value::String(s) => s.split(',').map(|f| f.trim().to_string()).collect(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.trim().to_string()),
                    other => Err(QueryError::UnknownField {
                        field: other.to_string(),
                        context: "fields",
                    }),
                })
                .collect::<Result<_, _>>()?,
            Value::Null => Vec::new(),
            other => {
                return Err(QueryError::UnknownField {
                    field: other.to_string(),
                    context: "fields",
                });
            }
        };

        let mut fields = Vec::new();
        for field in raw.into_iter().filter(|f| !f.is_empty()) {
            if !self.allow_list.contains(&field) {
                return Err(QueryError::UnknownField {
                    field,
                    context: "fields",
                });
            }
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Ok(fields)
    }

    fn parse_filters(&self, value: &Value) -> Result<BTreeMap<String, Predicate>, QueryError> {
        let decoded;
        let map = match value {
            Value::Object(map) => map,
            Value::String(s) if s.trim().is_empty() => return Ok(BTreeMap::new()),
            Value::String(s) => {
                decoded = serde_json::from_str::<Value>(s).map_err(|e| {
                    QueryError::InvalidFilterValue {
                        field: "filters".into(),
                        reason: e.to_string(),
                    }
                })?;
                match &decoded {
                    Value::Object(map) => map,
                    _ => {
                        return Err(QueryError::InvalidFilterValue {
                            field: "filters".into(),
                            reason: "expected an object".into(),
                        });
                    }
                }
            }
            Value::Null => return Ok(BTreeMap::new()),
            _ => {
                return Err(QueryError::InvalidFilterValue {
                    field: "filters".into(),
                    reason: "expected an object".into(),
                });
            }
        };

        let mut filters = BTreeMap::new();
        for (field, raw) in map {
            if !self.filterable.contains(field) {
                return Err(QueryError::UnknownField {
                    field: field.clone(),
                    context: "filters",
                });
            }
            filters.insert(field.clone(), Predicate::from_json(field, raw)?);
        }
        Ok(filters)
    }
}

/// Option values as received, before alias resolution.
#[derive(Default)]
struct RawOptions {
    limit: Option<Value>,
    page: Option<Value>,
    sort_field: Option<Value>,
    sort_dir: Option<Value>,
}

impl RawOptions {
    fn set(&mut self, key: &str, value: &Value) -> Result<(), QueryError> {
        let (slot, canonical) = match key {
            "limit" => (&mut self.limit, "limit"),
            "page" => (&mut self.page, "page"),
            "sortField" | "sort_by" => (&mut self.sort_field, "sortField"),
            _ => (&mut self.sort_dir, "sortDir"),
        };
        match slot {
            Some(existing) if existing != value => Err(QueryError::ConflictingAlias {
                key: canonical.to_string(),
            }),
            _ => {
                *slot = Some(value.clone());
                Ok(())
            }
        }
    }
}

/// Render a raw value for an error message, without quotes around text.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Integer from a JSON number or a numeric string.
fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn parse_search(value: &Value) -> Result<Option<String>, QueryError> {
    let token = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        _ => {
            return Err(QueryError::InvalidFilterValue {
                field: "search".into(),
                reason: "expected text".into(),
            });
        }
    };
    Ok(if token.is_empty() { None } else { Some(token) })
}
