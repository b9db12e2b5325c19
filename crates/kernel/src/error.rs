//! Application error types.
//!
//! The boundary taxonomy every layer above the repository speaks. Each
//! variant carries a stable code and maps to one HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::query::QueryError;
use crate::response::ApiResponse;

/// Message shown for unclassified failures.
pub const INTERNAL_MESSAGE: &str = "An unexpected error occurred";

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or disallowed input (422).
    #[error("{message}")]
    Validation { message: String, code: &'static str },

    /// Point lookup miss (404).
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation (409).
    #[error("{0}")]
    Conflict(String),

    /// Malformed identifier or request body (400).
    #[error("{message}")]
    BadRequest { message: String, code: &'static str },

    /// Unclassified failure (500); details never reach the client.
    #[error("An unexpected error occurred")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: "VALIDATION_ERROR",
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Stored data that cannot be compared with a filter operand.
    pub fn invalid_filter_value() -> Self {
        Self::BadRequest {
            message: "Filter value does not match the stored field type".into(),
            code: "INVALID_FILTER_VALUE",
        }
    }

    /// Identifier that does not parse as the stored id type.
    pub fn invalid_id(path: &str, value: &str) -> Self {
        Self::BadRequest {
            message: format!("Invalid {path}: {value}"),
            code: "INVALID_ID_FORMAT",
        }
    }

    /// Request body that is not valid JSON for the operation.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            code: "INVALID_JSON_BODY",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. } | Self::BadRequest { code, .. } => *code,
            Self::NotFound(_) => "RESOURCE_NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        Self::Validation {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::failure(&self, None, false).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
