//! In-process document collection.
//!
//! Backs every collection when no database is configured, and all
//! storage-dependent tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::eval::{matches, sort_documents};
use super::{CollectionSchema, Document, DocumentStore, StoreError, parse_id};
use crate::query::{Condition, FindOptions, ID_FIELD, Projection};

/// Collection held in memory; insertion order is creation order.
pub struct MemoryCollection {
    name: String,
    schema: CollectionSchema,
    docs: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>, schema: CollectionSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            docs: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Unique values in `doc` already held by another document.
    fn duplicates(
        &self,
        docs: &[Document],
        doc: &Document,
        own_id: &str,
    ) -> Option<BTreeMap<String, Value>> {
        let mut taken = BTreeMap::new();
        for field in &self.schema.unique {
            let Some(value) = doc.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = docs.iter().any(|other| {
                other.get(ID_FIELD).and_then(Value::as_str) != Some(own_id)
                    && other.get(field) == Some(value)
            });
            if clash {
                taken.insert(field.clone(), value.clone());
            }
        }
        if taken.is_empty() { None } else { Some(taken) }
    }
}

fn project(doc: &Document, projection: Option<&Projection>) -> Document {
    match projection {
        Some(p) => p.apply(doc),
        None => doc.clone(),
    }
}

fn id_of(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

#[async_trait]
impl DocumentStore for MemoryCollection {
    fn collection(&self) -> &str {
        &self.name
    }

    async fn find(
        &self,
        filter: &Condition,
        projection: Option<&Projection>,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let mut found: Vec<Document> = self
            .docs
            .read()
            .iter()
            .filter(|doc| matches(doc, filter))
            .cloned()
            .collect();

        if let Some(key) = &options.sort {
            sort_documents(&mut found, key);
        }

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options.limit.map_or(usize::MAX, |l| l as usize);
        Ok(found
            .iter()
            .skip(skip)
            .take(limit)
            .map(|doc| project(doc, projection))
            .collect())
    }

    async fn find_one(
        &self,
        filter: &Condition,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .docs
            .read()
            .iter()
            .find(|doc| matches(doc, filter))
            .map(|doc| project(doc, projection)))
    }

    async fn find_by_id(
        &self,
        id: &str,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?.to_string();
        Ok(self
            .docs
            .read()
            .iter()
            .find(|doc| id_of(doc) == Some(id.as_str()))
            .map(|doc| project(doc, projection)))
    }

    async fn count_documents(&self, filter: &Condition) -> Result<u64, StoreError> {
        let count = self
            .docs
            .read()
            .iter()
            .filter(|doc| matches(doc, filter))
            .count();
        Ok(count as u64)
    }

    async fn create(&self, mut doc: Document) -> Result<Document, StoreError> {
        let id = match doc.get(ID_FIELD) {
            Some(Value::String(raw)) => parse_id(raw)?,
            Some(other) => {
                return Err(StoreError::Cast {
                    path: ID_FIELD.into(),
                    value: other.to_string(),
                });
            }
            None => Uuid::now_v7(),
        };
        let id = id.to_string();
        doc.insert(ID_FIELD.into(), Value::String(id.clone()));
        self.schema.check_required(&doc)?;

        let mut docs = self.docs.write();
        if docs.iter().any(|d| id_of(d) == Some(id.as_str())) {
            return Err(StoreError::DuplicateKey(BTreeMap::from([(
                ID_FIELD.to_string(),
                Value::String(id),
            )])));
        }
        if let Some(taken) = self.duplicates(&docs, &doc, &id) {
            return Err(StoreError::DuplicateKey(taken));
        }
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn find_by_id_and_update(
        &self,
        id: &str,
        mut doc: Document,
    ) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?.to_string();
        doc.insert(ID_FIELD.into(), Value::String(id.clone()));

        let mut docs = self.docs.write();
        let Some(index) = docs.iter().position(|d| id_of(d) == Some(id.as_str())) else {
            return Ok(None);
        };
        self.schema.check_required(&doc)?;
        if let Some(taken) = self.duplicates(&docs, &doc, &id) {
            return Err(StoreError::DuplicateKey(taken));
        }
        docs[index] = doc.clone();
        Ok(Some(doc))
    }

    async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?.to_string();
        let mut docs = self.docs.write();
        Ok(docs
            .iter()
            .position(|d| id_of(d) == Some(id.as_str()))
            .map(|index| docs.remove(index)))
    }
}
