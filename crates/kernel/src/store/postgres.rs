//! PostgreSQL document collection.
//!
//! One table per collection:
//!
//! ```sql
//! CREATE TABLE users (
//!     id UUID PRIMARY KEY,
//!     doc JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE UNIQUE INDEX users_email_key ON users ((doc ->> 'email'));
//! ```

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CollectionSchema, Document, DocumentStore, FieldViolation, StoreError, parse_id};
use crate::query::filter::parse_date;
use crate::query::sql::{self, is_safe_identifier};
use crate::query::{Condition, FindOptions, ID_FIELD, Projection};

/// Collection stored as a JSONB table.
pub struct PgCollection {
    pool: PgPool,
    table: String,
    schema: CollectionSchema,
}

impl PgCollection {
    /// Fails when the table or a unique field is not a safe identifier.
    pub fn new(
        pool: PgPool,
        table: impl Into<String>,
        schema: CollectionSchema,
    ) -> Result<Self, StoreError> {
        let table = table.into();
        if let Some(bad) = std::iter::once(&table)
            .chain(schema.unique.iter())
            .find(|name| !is_safe_identifier(name))
        {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "unsafe collection identifier '{bad}'"
            )));
        }
        Ok(Self {
            pool,
            table,
            schema,
        })
    }

    /// Create the table and its unique indexes if they do not exist.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        let table = &self.table;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id UUID PRIMARY KEY, \
             doc JSONB NOT NULL, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
             updated_at TIMESTAMPTZ NOT NULL DEFAULT now())"
        ))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to create collection {table}"))?;

        for field in &self.schema.unique {
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}_{field}_key ON {table} ((doc ->> '{field}'))"
            ))
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to create unique index on {table}.{field}"))?;
        }

        tracing::debug!(collection = %table, "collection ready");
        Ok(())
    }

    /// Translate a driver error, resolving duplicate fields from `doc`.
    fn translate(&self, err: sqlx::Error, doc: Option<&Document>, action: &str) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some("23505") => {
                    let field = match db.constraint() {
                        Some(c) if c == format!("{}_pkey", self.table) => ID_FIELD.to_string(),
                        Some(c) => c
                            .strip_prefix(&format!("{}_", self.table))
                            .and_then(|rest| rest.strip_suffix("_key"))
                            .unwrap_or(c)
                            .to_string(),
                        None => "unknown".to_string(),
                    };
                    let value = doc
                        .and_then(|d| d.get(&field))
                        .cloned()
                        .unwrap_or(Value::Null);
                    return StoreError::DuplicateKey(BTreeMap::from([(field, value)]));
                }
                // Ids are parsed before any statement runs, so these come
                // from casting stored fields for a filter or sort.
                Some("22P02" | "22007" | "22008" | "22003") => {
                    return StoreError::Conversion(db.message().to_string());
                }
                Some("23502") => {
                    return StoreError::Validation(vec![FieldViolation::new(
                        "doc",
                        db.message().to_string(),
                    )]);
                }
                _ => {}
            }
        }
        StoreError::Backend(
            anyhow::Error::new(err).context(format!("failed to {action} in {}", self.table)),
        )
    }
}

/// Uuid of a document about to be written.
fn document_id(doc: &Document) -> Result<Uuid, StoreError> {
    match doc.get(ID_FIELD) {
        Some(Value::String(raw)) => parse_id(raw),
        Some(other) => Err(StoreError::Cast {
            path: ID_FIELD.into(),
            value: other.to_string(),
        }),
        None => Ok(Uuid::now_v7()),
    }
}

fn timestamp(doc: &Document, field: &str) -> DateTime<Utc> {
    doc.get(field)
        .and_then(Value::as_str)
        .and_then(parse_date)
        .unwrap_or_else(Utc::now)
}

fn into_document(value: Value) -> Result<Document, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Backend(anyhow::anyhow!(
            "stored document is not an object: {other}"
        ))),
    }
}

fn project(doc: Document, projection: Option<&Projection>) -> Document {
    match projection {
        Some(p) => p.apply(&doc),
        None => doc,
    }
}

#[async_trait]
impl DocumentStore for PgCollection {
    fn collection(&self) -> &str {
        &self.table
    }

    async fn find(
        &self,
        filter: &Condition,
        projection: Option<&Projection>,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let query = sql::select(&self.table, filter, projection, options)
            .map_err(|e| StoreError::Backend(e.into()))?;
        tracing::debug!(collection = %self.table, sql = %query, "find");

        let rows: Vec<Value> = sqlx::query_scalar(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.translate(e, None, "find documents"))?;
        rows.into_iter().map(into_document).collect()
    }

    async fn find_one(
        &self,
        filter: &Condition,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError> {
        let options = FindOptions {
            limit: Some(1),
            ..FindOptions::default()
        };
        let mut found = self.find(filter, projection, &options).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    async fn find_by_id(
        &self,
        id: &str,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?;
        let row: Option<Value> =
            sqlx::query_scalar(&format!("SELECT doc FROM {} WHERE id = $1", self.table))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| self.translate(e, None, "fetch document by id"))?;
        row.map(|v| into_document(v).map(|doc| project(doc, projection)))
            .transpose()
    }

    async fn count_documents(&self, filter: &Condition) -> Result<u64, StoreError> {
        let query =
            sql::count(&self.table, filter).map_err(|e| StoreError::Backend(e.into()))?;
        let count: i64 = sqlx::query_scalar(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.translate(e, None, "count documents"))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn create(&self, mut doc: Document) -> Result<Document, StoreError> {
        let id = document_id(&doc)?;
        doc.insert(ID_FIELD.into(), Value::String(id.to_string()));
        self.schema.check_required(&doc)?;

        let created_at = timestamp(&doc, "createdAt");
        let updated_at = timestamp(&doc, "updatedAt");
        let row: Value = sqlx::query_scalar(&format!(
            "INSERT INTO {} (id, doc, created_at, updated_at) VALUES ($1, $2, $3, $4) RETURNING doc",
            self.table
        ))
        .bind(id)
        .bind(Value::Object(doc.clone()))
        .bind(created_at)
        .bind(updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| self.translate(e, Some(&doc), "create document"))?;
        into_document(row)
    }

    async fn find_by_id_and_update(
        &self,
        id: &str,
        mut doc: Document,
    ) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?;
        doc.insert(ID_FIELD.into(), Value::String(id.to_string()));
        self.schema.check_required(&doc)?;

        let updated_at = timestamp(&doc, "updatedAt");
        let row: Option<Value> = sqlx::query_scalar(&format!(
            "UPDATE {} SET doc = $2, updated_at = $3 WHERE id = $1 RETURNING doc",
            self.table
        ))
        .bind(id)
        .bind(Value::Object(doc.clone()))
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| self.translate(e, Some(&doc), "update document"))?;
        row.map(into_document).transpose()
    }

    async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?;
        let row: Option<Value> = sqlx::query_scalar(&format!(
            "DELETE FROM {} WHERE id = $1 RETURNING doc",
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| self.translate(e, None, "delete document"))?;
        row.map(into_document).transpose()
    }
}
