//! Contact model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, Validate, require_non_empty, require_non_empty_opt};
use crate::error::AppError;
use crate::query::{QueryError, QuerySchema, QuerySchemaConfig};
use crate::store::CollectionSchema;

const MAX_LIMIT: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateContact {
    pub name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Validate for CreateContact {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty("name", &self.name)
    }
}

impl Validate for UpdateContact {
    fn validate(&self) -> Result<(), AppError> {
        require_non_empty_opt("name", self.name.as_deref())
    }
}

impl Entity for Contact {
    const COLLECTION: &'static str = "contacts";
    const LABEL: &'static str = "Contact";

    type Create = CreateContact;
    type Update = UpdateContact;

    fn query_schema(max_limit: u32) -> Result<QuerySchema, QueryError> {
        QuerySchema::new(
            ["id", "name", "createdAt"],
            QuerySchemaConfig::default()
                .max_limit(MAX_LIMIT.min(max_limit))
                .strict(true)
                .searchable(&["name"])
                .dates(&["createdAt"]),
        )
    }

    fn collection_schema() -> CollectionSchema {
        CollectionSchema::new(&["name"], &[])
    }
}
