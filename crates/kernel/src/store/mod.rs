//! Document storage collaborators.
//!
//! A [`DocumentStore`] owns one collection of JSON documents and executes
//! compiled queries against it. Two backends exist: [`MemoryCollection`]
//! and [`PgCollection`]. Both surface the same typed [`StoreError`]s so the
//! repository can translate them uniformly.

pub mod eval;
pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::query::{Condition, FindOptions, Projection};

pub use memory::MemoryCollection;
pub use postgres::PgCollection;

/// A stored document.
pub type Document = Map<String, Value>;

/// One failed field check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Storage-level failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A value could not be converted to the stored type (malformed id).
    #[error("cast failed for {path}: {value}")]
    Cast { path: String, value: String },

    /// A stored value could not be converted to a filter operand's type.
    ///
    /// Carries the backend's message for logging only.
    #[error("operand conversion failed: {0}")]
    Conversion(String),

    /// The document failed the collection's field checks.
    #[error("document validation failed")]
    Validation(Vec<FieldViolation>),

    #[error("document not found")]
    NotFound,

    /// Unique field values already taken, keyed by field.
    #[error("duplicate key")]
    DuplicateKey(BTreeMap<String, Value>),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Field constraints enforced by every backend.
#[derive(Debug, Clone, Default)]
pub struct CollectionSchema {
    pub required: Vec<String>,
    pub unique: Vec<String>,
}

impl CollectionSchema {
    pub fn new(required: &[&str], unique: &[&str]) -> Self {
        Self {
            required: required.iter().map(|f| (*f).to_string()).collect(),
            unique: unique.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    /// Every required field must be present, non-null and not blank.
    pub fn check_required(&self, doc: &Document) -> Result<(), StoreError> {
        let violations: Vec<FieldViolation> = self
            .required
            .iter()
            .filter(|field| match doc.get(field.as_str()) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .map(|field| FieldViolation::new(field.clone(), format!("{field} is required")))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(violations))
        }
    }
}

/// Parse a document id, failing with a cast error.
pub fn parse_id(id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::Cast {
        path: "id".into(),
        value: id.to_string(),
    })
}

/// Persistence contract for one collection.
///
/// Implementations must be safe for concurrent use by many in-flight
/// requests.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Collection name, used for logging and metrics.
    fn collection(&self) -> &str;

    /// Documents matching `filter`, sorted, paged and projected.
    async fn find(
        &self,
        filter: &Condition,
        projection: Option<&Projection>,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// First document matching `filter` in creation order.
    async fn find_one(
        &self,
        filter: &Condition,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError>;

    async fn find_by_id(
        &self,
        id: &str,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError>;

    async fn count_documents(&self, filter: &Condition) -> Result<u64, StoreError>;

    /// Insert a document carrying its own `id`.
    async fn create(&self, doc: Document) -> Result<Document, StoreError>;

    /// Replace a document, returning the stored result or `None` when the
    /// id does not exist.
    async fn find_by_id_and_update(
        &self,
        id: &str,
        doc: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Remove a document, returning it or `None` when the id does not exist.
    async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<Document>, StoreError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_fields_are_reported_together() {
        let schema = CollectionSchema::new(&["name", "email"], &[]);
        let doc = json!({"name": "  "}).as_object().cloned().unwrap();
        let Err(StoreError::Validation(violations)) = schema.check_required(&doc) else {
            panic!("expected validation failure");
        };
        let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["name", "email"]);
    }

    #[test]
    fn malformed_id_is_a_cast_error() {
        let err = parse_id("not-a-uuid").unwrap_err();
        assert!(matches!(err, StoreError::Cast { ref path, .. } if path == "id"));
        assert!(parse_id("0190a6e2-8f3c-7b2a-9c4d-1e2f3a4b5c6d").is_ok());
    }
}
