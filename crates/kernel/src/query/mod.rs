//! Generic query engine.
//!
//! Raw, untyped query objects flow through two stages:
//! 1. [`QuerySchema::validate`] checks them against an entity allow-list and
//!    produces canonical [`QueryParams`].
//! 2. [`QueryCompiler::compile`] turns those into a backend-neutral
//!    [`CompiledQuery`], which storage backends execute.

pub mod compiler;
pub mod error;
pub mod filter;
pub mod params;
pub mod schema;
pub mod sql;
pub mod types;

pub use compiler::{CompiledQuery, FindOptions, ID_FIELD, Projection, QueryCompiler, SortKey};
pub use error::QueryError;
pub use filter::{Condition, MatchMode, Operand, Operation, Predicate};
pub use params::{raw_query_from_pairs, raw_query_from_str};
pub use schema::{QuerySchema, QuerySchemaConfig};
pub use types::{
    DEFAULT_LIMIT, DEFAULT_MAX_LIMIT, FieldKind, QueryOptions, QueryParams, QueryResult,
    SortDirection,
};
