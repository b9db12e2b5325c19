//! Query engine errors.

use thiserror::Error;

/// Failure raised while validating or compiling a query.
///
/// Every variant is a client error: it maps to a 422 response with the
/// stable code returned by [`QueryError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Unknown field '{field}' in {context}")]
    UnknownField { field: String, context: &'static str },

    #[error("Invalid operator '{operator}' for field '{field}'")]
    InvalidOperator { field: String, operator: String },

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidFilterValue { field: String, reason: String },

    #[error("Operator 'in' for field '{field}' requires a non-empty list")]
    EmptyInSet { field: String },

    #[error("Filter for field '{field}' has no operator")]
    EmptyPredicate { field: String },

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Invalid page: {0}")]
    InvalidPage(String),

    #[error("Invalid sort direction '{0}', expected asc or desc")]
    InvalidSortDirection(String),

    #[error("Unknown query parameter '{key}'")]
    UnknownParameter { key: String },

    #[error("Conflicting values for '{key}' and its alias")]
    ConflictingAlias { key: String },

    #[error("Paging past the first page requires a limit")]
    PageWithoutLimit,

    #[error("Invalid query schema: {0}")]
    InvalidSchema(String),

    #[error("Query must be an object")]
    NotAnObject,
}

impl QueryError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownField { .. } => "UNKNOWN_FIELD",
            Self::InvalidOperator { .. } => "INVALID_OPERATOR",
            Self::InvalidFilterValue { .. } => "INVALID_FILTER_VALUE",
            Self::UnknownParameter { .. } => "UNKNOWN_PARAMETER",
            _ => "VALIDATION_ERROR",
        }
    }
}
