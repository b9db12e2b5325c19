//! Query compiler.
//!
//! Turns canonical [`QueryParams`] into a backend-neutral
//! [`CompiledQuery`]: a condition tree, an optional projection and find
//! options. Storage backends consume the compiled form only, so the same
//! parameters can target the in-memory and the PostgreSQL collections.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::error::QueryError;
use super::filter::{Condition, MatchMode, Predicate, compile_predicate};
use super::schema::QuerySchema;
use super::types::{FieldKind, QueryParams, SortDirection};

/// Identifier field always present in projections.
pub const ID_FIELD: &str = "id";

/// Ordered set of projected fields; always includes `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection(Vec<String>);

impl Projection {
    /// Build from requested fields; `None` when nothing was requested.
    pub fn new<I, S>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for field in fields {
            let field = field.into();
            if !out.contains(&field) {
                out.push(field);
            }
        }
        if out.is_empty() {
            return None;
        }
        if !out.iter().any(|f| f == ID_FIELD) {
            out.push(ID_FIELD.to_string());
        }
        Some(Self(out))
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// Keep only the projected fields that exist in `doc`.
    pub fn apply(&self, doc: &Map<String, Value>) -> Map<String, Value> {
        self.0
            .iter()
            .filter_map(|f| doc.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    }
}

/// Sort key with the field's comparison type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
    pub kind: FieldKind,
}

/// Pagination and ordering for a find.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub limit: Option<u32>,
    pub skip: u64,
    pub sort: Option<SortKey>,
}

/// Backend-neutral compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub filter: Condition,
    pub projection: Option<Projection>,
    pub options: FindOptions,
}

/// Compiles parameters against one entity's schema.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    schema: Arc<QuerySchema>,
}

impl QueryCompiler {
    pub fn new(schema: Arc<QuerySchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &QuerySchema {
        &self.schema
    }

    /// Compile validated parameters.
    pub fn compile(&self, params: &QueryParams) -> Result<CompiledQuery, QueryError> {
        let mut filter = self.compile_filters(&params.filters)?;
        if let Some(search) = self.search_condition(params.search.as_deref()) {
            filter = Condition::and(vec![filter, search]);
        }

        let limit = params.options.limit;
        let page = params.options.page.unwrap_or(1);
        let skip = match (page, limit) {
            (p, _) if p <= 1 => 0,
            (_, None) => return Err(QueryError::PageWithoutLimit),
            (p, Some(l)) => u64::from(p - 1) * u64::from(l),
        };

        let sort = params.options.sort_field.as_ref().map(|field| SortKey {
            field: field.clone(),
            direction: params.options.sort_dir.unwrap_or_default(),
            kind: self.schema.field_kind(field),
        });

        Ok(CompiledQuery {
            filter,
            projection: Projection::new(params.fields.iter().cloned()),
            options: FindOptions { limit, skip, sort },
        })
    }

    /// Compile a filter map alone, ANDed across fields.
    pub fn compile_filters(
        &self,
        filters: &BTreeMap<String, Predicate>,
    ) -> Result<Condition, QueryError> {
        let conditions = filters
            .iter()
            .map(|(field, predicate)| {
                compile_predicate(field, predicate, self.schema.field_kind(field))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Condition::and(conditions))
    }

    /// OR of case-insensitive `contains` over the searchable fields.
    fn search_condition(&self, search: Option<&str>) -> Option<Condition> {
        let token = search.map(str::trim).filter(|s| !s.is_empty())?;
        let fields = self.schema.searchable_fields();
        if fields.is_empty() {
            return None;
        }
        Some(Condition::Any(
            fields
                .iter()
                .map(|field| Condition::Match {
                    field: field.clone(),
                    needle: token.to_string(),
                    mode: MatchMode::Contains,
                })
                .collect(),
        ))
    }
}
