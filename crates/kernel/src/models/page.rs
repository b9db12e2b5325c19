//! Page model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Entity, Validate, is_valid_slug, is_valid_url, require_non_empty, require_non_empty_opt};
use crate::error::AppError;
use crate::query::{QueryError, QuerySchema, QuerySchemaConfig};
use crate::store::CollectionSchema;

const MAX_LIMIT: u32 = 50;

/// Publication state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// Search engine metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_index: Option<bool>,
}

impl Validate for Seo {
    fn validate(&self) -> Result<(), AppError> {
        match &self.canonical_url {
            Some(url) if !is_valid_url(url) => Err(AppError::validation(format!(
                "seo.canonicalUrl is not a valid URL: {url}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Page record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<Seo>,
    #[serde(default)]
    pub status: PageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a page.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePage {
    pub title: String,
    pub slug: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<Seo>,
    #[serde(default)]
    pub status: PageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Input for updating a page.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<Seo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

fn check_slug(slug: &str) -> Result<(), AppError> {
    if !is_valid_slug(slug) {
        return Err(AppError::validation(format!(
            "slug must be lower-case words separated by hyphens: {slug}"
        )));
    }
    Ok(())
}

fn check_path(path: &str) -> Result<(), AppError> {
    if !path.starts_with('/') {
        return Err(AppError::validation(format!("path must start with '/': {path}")));
    }
    Ok(())
}

impl Validate for CreatePage {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty("title", &self.title)?;
        check_slug(&self.slug)?;
        check_path(&self.path)?;
        self.seo.as_ref().map_or(Ok(()), Validate::validate)
    }
}

impl Validate for UpdatePage {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty_opt("title", self.title.as_deref())?;
        if let Some(slug) = &self.slug {
            check_slug(slug)?;
        }
        if let Some(path) = &self.path {
            check_path(path)?;
        }
        self.seo.as_ref().map_or(Ok(()), Validate::validate)
    }
}

impl Entity for Page {
    const COLLECTION: &'static str = "pages";
    const LABEL: &'static str = "Page";

    type Create = CreatePage;
    type Update = UpdatePage;

    fn query_schema(max_limit: u32) -> Result<QuerySchema, QueryError> {
        QuerySchema::new(
            ["id", "title", "publishedAt", "status", "createdAt", "slug", "path"],
            QuerySchemaConfig::default()
                .max_limit(MAX_LIMIT.min(max_limit))
                .strict(true)
                .searchable(&["title", "slug"])
                .dates(&["publishedAt", "createdAt"]),
        )
    }

    fn collection_schema() -> CollectionSchema {
        CollectionSchema::new(&["title", "slug", "path"], &["title", "slug", "path"])
    }
}
