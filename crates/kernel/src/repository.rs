//! Repository query executor.
//!
//! One [`Repository`] per entity binds a document collection to the
//! entity's compiled query schema. It is the only layer that sees
//! [`StoreError`]; everything it returns speaks [`AppError`].

use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::models::{CREATED_AT, Entity, UPDATED_AT};
use crate::query::{
    Condition, ID_FIELD, Predicate, Projection, QueryCompiler, QueryParams, QueryResult,
    QuerySchema,
};
use crate::store::{Document, DocumentStore, StoreError};

/// Current time in the stored timestamp format.
pub fn now_timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Query executor for one entity type.
pub struct Repository<E: Entity> {
    store: Arc<dyn DocumentStore>,
    compiler: QueryCompiler,
    metrics: Arc<Metrics>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn DocumentStore>, schema: Arc<QuerySchema>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            compiler: QueryCompiler::new(schema),
            metrics,
            _entity: PhantomData,
        }
    }

    /// Allow-list and configuration raw queries are validated against.
    pub fn schema(&self) -> &QuerySchema {
        self.compiler.schema()
    }

    pub fn collection(&self) -> &str {
        self.store.collection()
    }

    /// Persist a new entity stamped with an id and timestamps.
    pub async fn create(&self, input: E::Create) -> AppResult<E> {
        self.observe("create", async {
            let mut doc = E::create_document(input)?;
            let now = now_timestamp();
            doc.insert(ID_FIELD.into(), Value::String(Uuid::now_v7().to_string()));
            doc.insert(CREATED_AT.into(), now.clone());
            doc.insert(UPDATED_AT.into(), now);

            let stored = self.store.create(doc).await.map_err(|e| self.translate(e))?;
            debug!(collection = %self.collection(), id = ?stored.get(ID_FIELD), "document created");
            self.into_entity(stored)
        })
        .await
    }

    /// Fetch one document by id, restricted to `fields` when non-empty.
    pub async fn find_by_id(&self, id: &str, fields: &[String]) -> AppResult<Document> {
        self.observe("find_by_id", async {
            let projection = Projection::new(fields.iter().cloned());
            self.store
                .find_by_id(id, projection.as_ref())
                .await
                .map_err(|e| self.translate(e))?
                .map(|doc| self.redact(doc))
                .ok_or_else(|| self.translate(StoreError::NotFound))
        })
        .await
    }

    /// Fetch one entity by id.
    pub async fn get(&self, id: &str) -> AppResult<E> {
        let doc = self.find_by_id(id, &[]).await?;
        self.into_entity(doc)
    }

    /// First document matching the query's filter.
    pub async fn find_one(&self, params: &QueryParams) -> AppResult<Document> {
        self.observe("find_one", async {
            let compiled = self.compiler.compile(params)?;
            self.store
                .find_one(&compiled.filter, compiled.projection.as_ref())
                .await
                .map_err(|e| self.translate(e))?
                .map(|doc| self.redact(doc))
                .ok_or_else(|| self.translate(StoreError::NotFound))
        })
        .await
    }

    /// Merge `input` over the stored entity and write the result.
    ///
    /// Fields absent from the input keep their stored values; only
    /// `updatedAt` changes for an empty input.
    pub async fn update(&self, id: &str, input: E::Update) -> AppResult<E> {
        self.observe("update", async {
            let patch = E::update_document(input)?;
            let mut current = self
                .store
                .find_by_id(id, None)
                .await
                .map_err(|e| self.translate(e))?
                .ok_or_else(|| self.translate(StoreError::NotFound))?;

            current.extend(patch);
            current.insert(UPDATED_AT.into(), now_timestamp());

            let stored = self
                .store
                .find_by_id_and_update(id, current)
                .await
                .map_err(|e| self.translate(e))?
                .ok_or_else(|| self.translate(StoreError::NotFound))?;
            self.into_entity(stored)
        })
        .await
    }

    /// Delete by id; `false` when nothing was stored under it.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        self.observe("delete", async {
            let removed = self
                .store
                .find_by_id_and_delete(id)
                .await
                .map_err(|e| self.translate(e))?;
            Ok(removed.is_some())
        })
        .await
    }

    /// Page of documents plus the total and filtered counts.
    ///
    /// The two counts and the page fetch run concurrently and are not a
    /// snapshot: under concurrent writes they may disagree slightly.
    pub async fn query(&self, params: &QueryParams) -> AppResult<QueryResult<Document>> {
        self.observe("query", async {
            let compiled = self.compiler.compile(params)?;
            let everything = Condition::match_all();

            let (total_count, filter_count, items) = tokio::try_join!(
                self.store.count_documents(&everything),
                self.store.count_documents(&compiled.filter),
                self.store.find(
                    &compiled.filter,
                    compiled.projection.as_ref(),
                    &compiled.options
                ),
            )
            .map_err(|e| self.translate(e))?;

            Ok(QueryResult {
                items: items.into_iter().map(|doc| self.redact(doc)).collect(),
                total_count,
                filter_count,
            })
        })
        .await
    }

    /// Number of documents matching validated filters.
    pub async fn count(&self, filters: &BTreeMap<String, Predicate>) -> AppResult<u64> {
        self.observe("count", async {
            let filter = self.compiler.compile_filters(filters)?;
            self.store
                .count_documents(&filter)
                .await
                .map_err(|e| self.translate(e))
        })
        .await
    }

    async fn observe<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        let result = fut.await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        self.metrics
            .record_operation(self.collection(), operation, outcome);
        result
    }

    fn redact(&self, mut doc: Document) -> Document {
        for field in E::HIDDEN_FIELDS {
            doc.remove(*field);
        }
        doc
    }

    fn into_entity(&self, doc: Document) -> AppResult<E> {
        let entity = serde_json::from_value(Value::Object(self.redact(doc)))
            .with_context(|| format!("stored {} does not match its model", E::LABEL))?;
        Ok(entity)
    }

    /// Map a storage failure onto the boundary taxonomy, logging it once.
    fn translate(&self, err: StoreError) -> AppError {
        let collection = self.collection();
        match err {
            StoreError::Cast { path, value } => {
                error!(%collection, %path, %value, "cast error");
                AppError::invalid_id(&path, &value)
            }
            StoreError::Conversion(detail) => {
                error!(%collection, %detail, "filter operand conversion failed");
                AppError::invalid_filter_value()
            }
            StoreError::Validation(violations) => {
                error!(%collection, ?violations, "document validation failed");
                let messages: Vec<&str> = violations.iter().map(|v| v.message.as_str()).collect();
                AppError::validation(format!("Validation failed: {}", messages.join(", ")))
            }
            StoreError::NotFound => {
                warn!(%collection, "document not found");
                AppError::not_found(format!("{} not found", E::LABEL))
            }
            StoreError::DuplicateKey(fields) => {
                error!(%collection, ?fields, "duplicate key");
                let names: Vec<&str> = fields.keys().map(String::as_str).collect();
                AppError::conflict(format!(
                    "Duplicate value for unique field: {}",
                    names.join(", ")
                ))
            }
            StoreError::Backend(e) => {
                error!(%collection, error = %e, "storage failure");
                AppError::Internal(e)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::contact::{CreateContact, UpdateContact};
    use crate::models::{Contact, User};
    use crate::store::{CollectionSchema, FieldViolation, MemoryCollection};

    fn contacts() -> Repository<Contact> {
        let store = Arc::new(MemoryCollection::new(
            Contact::COLLECTION,
            Contact::collection_schema(),
        ));
        let schema = Arc::new(Contact::query_schema(100).unwrap());
        Repository::new(store, schema, Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn create_stamps_id_and_timestamps() {
        let repo = contacts();
        let contact = repo
            .create(CreateContact { name: "Ann".into() })
            .await
            .unwrap();
        assert_eq!(contact.name, "Ann");
        assert_eq!(contact.created_at, contact.updated_at);
        let fetched = repo.get(&contact.id.to_string()).await.unwrap();
        assert_eq!(fetched.id, contact.id);
    }

    #[tokio::test]
    async fn empty_update_only_bumps_updated_at() {
        let repo = contacts();
        let created = repo
            .create(CreateContact { name: "Ann".into() })
            .await
            .unwrap();
        let updated = repo
            .update(&created.id.to_string(), UpdateContact::default())
            .await
            .unwrap();
        assert_eq!(updated.name, "Ann");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn missing_and_malformed_ids() {
        let repo = contacts();
        let missing = Uuid::now_v7().to_string();
        let err = repo.get(&missing).await.unwrap_err();
        assert_eq!(err.code(), "RESOURCE_NOT_FOUND");
        assert_eq!(err.to_string(), "Contact not found");

        let err = repo.find_by_id("42", &[]).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ID_FORMAT");

        assert!(!repo.delete(&missing).await.unwrap());
        let err = repo
            .update(&missing, UpdateContact::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RESOURCE_NOT_FOUND");
    }

    #[tokio::test]
    async fn translation_table() {
        let repo = contacts();
        let err = repo.translate(StoreError::Validation(vec![
            FieldViolation::new("name", "name is required"),
            FieldViolation::new("email", "email is required"),
        ]));
        assert_eq!(err.status().as_u16(), 422);
        assert_eq!(
            err.to_string(),
            "Validation failed: name is required, email is required"
        );

        let err = repo.translate(StoreError::DuplicateKey(BTreeMap::from([(
            "email".to_string(),
            Value::from("a@x.io"),
        )])));
        assert_eq!(err.status().as_u16(), 409);
        assert_eq!(err.to_string(), "Duplicate value for unique field: email");

        let err = repo.translate(StoreError::Conversion(
            "invalid input syntax for type numeric: \"abc\"".into(),
        ));
        assert_eq!(err.status().as_u16(), 400);
        assert_eq!(err.code(), "INVALID_FILTER_VALUE");
        assert!(!err.to_string().contains("numeric"), "{err}");

        let err = repo.translate(StoreError::Cast {
            path: "id".into(),
            value: "42".into(),
        });
        assert_eq!(err.code(), "INVALID_ID_FORMAT");

        let err = repo.translate(StoreError::Backend(anyhow::anyhow!("socket closed")));
        assert_eq!(err.status().as_u16(), 500);
        assert!(!err.to_string().contains("socket"));
    }

    #[tokio::test]
    async fn hidden_fields_never_leave_the_repository() {
        let store = Arc::new(MemoryCollection::new(
            User::COLLECTION,
            CollectionSchema::default(),
        ));
        let repo: Repository<User> = Repository::new(
            store,
            Arc::new(User::query_schema(100).unwrap()),
            Arc::new(Metrics::new()),
        );
        let user = repo
            .create(crate::models::user::CreateUser {
                name: "Ann".into(),
                email: "ann@example.com".into(),
                password: "longenough".into(),
                role: None,
                is_active: None,
            })
            .await
            .unwrap();
        let doc = repo.find_by_id(&user.id.to_string(), &[]).await.unwrap();
        assert!(!doc.contains_key("passwordHash"));
        let page = repo.query(&QueryParams::default()).await.unwrap();
        assert!(page.items.iter().all(|d| !d.contains_key("passwordHash")));
    }

    #[tokio::test]
    async fn operations_are_counted() {
        let metrics = Arc::new(Metrics::new());
        let store = Arc::new(MemoryCollection::new(
            Contact::COLLECTION,
            Contact::collection_schema(),
        ));
        let repo: Repository<Contact> = Repository::new(
            store,
            Arc::new(Contact::query_schema(100).unwrap()),
            metrics.clone(),
        );
        let _ = repo.get(&Uuid::now_v7().to_string()).await;
        let output = metrics.encode();
        assert!(output.contains(r#"operation="find_by_id""#));
        assert!(output.contains(r#"outcome="RESOURCE_NOT_FOUND""#));
    }
}
