//! Entity models.
//!
//! Each entity declares its collection, its query allow-list and the
//! documents its create and update inputs turn into. The repository and the
//! HTTP surface are generic over [`Entity`].

pub mod contact;
pub mod form;
pub mod page;
pub mod user;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;
use crate::query::{QueryError, QuerySchema};
use crate::store::{CollectionSchema, Document};

pub use contact::Contact;
pub use form::Form;
pub use page::{Page, PageStatus};
pub use user::{Role, User};

/// Fields every entity carries.
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Input checks run before anything touches storage.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// A stored entity type.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection (table) name.
    const COLLECTION: &'static str;

    /// Human-readable name used in messages ("User not found").
    const LABEL: &'static str;

    /// Stored fields never returned to callers.
    const HIDDEN_FIELDS: &'static [&'static str] = &[];

    type Create: Serialize + DeserializeOwned + Validate + Send + Sync;
    type Update: Serialize + DeserializeOwned + Validate + Send + Sync;

    /// Query allow-list and configuration; `max_limit` is the global
    /// ceiling and caps the entity's own maximum.
    fn query_schema(max_limit: u32) -> Result<QuerySchema, QueryError>;

    /// Required and unique fields enforced by storage.
    fn collection_schema() -> CollectionSchema;

    /// Document stored for a validated create input.
    fn create_document(input: Self::Create) -> Result<Document, AppError> {
        to_document(&input)
    }

    /// Partial document merged over the stored one on update.
    fn update_document(input: Self::Update) -> Result<Document, AppError> {
        to_document(&input)
    }
}

/// Serialize an input into a document; `None` fields are expected to be
/// skipped by the input's serde attributes.
pub fn to_document<T: Serialize>(input: &T) -> Result<Document, AppError> {
    match serde_json::to_value(input) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AppError::Internal(anyhow::anyhow!(
            "input serialized to a non-object: {other}"
        ))),
        Err(e) => Err(AppError::Internal(e.into())),
    }
}

/// Fail unless `value` has non-whitespace content.
pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Check an optional value only when present.
pub fn require_non_empty_opt(field: &str, value: Option<&str>) -> Result<(), AppError> {
    value.map_or(Ok(()), |v| require_non_empty(field, v))
}

/// Basic email shape: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.splitn(3, '@').collect();
    if parts.len() != 2 {
        return false;
    }
    let (local, domain) = (parts[0], parts[1]);
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

static SLUG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").ok());

/// Lower-case words joined by single hyphens.
pub fn is_valid_slug(slug: &str) -> bool {
    SLUG.as_ref().is_some_and(|re| re.is_match(slug))
}

/// Absolute http(s) URL.
pub fn is_valid_url(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}
