//! Quarry test utilities.
//!
//! Helpers for integration testing: seed documents, raw query builders
//! and assertion utilities for envelope responses.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Fixed reference instant so seeded timestamps are deterministic.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Create a seed document with a name.
pub fn test_doc(name: &str) -> TestDoc {
    TestDoc {
        id: None,
        fields: Map::from_iter([("name".to_string(), Value::from(name))]),
        created_at: epoch(),
    }
}

/// A seed document builder.
#[derive(Debug, Clone)]
pub struct TestDoc {
    pub id: Option<Uuid>,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl TestDoc {
    /// Set a custom ID.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Add a single field.
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Created `days` days after [`epoch`].
    pub fn created_day(mut self, days: i64) -> Self {
        self.created_at = epoch() + Duration::days(days);
        self
    }

    /// Document with `id` (when set), `createdAt` and `updatedAt`.
    pub fn build(self) -> Map<String, Value> {
        let mut doc = self.fields;
        if let Some(id) = self.id {
            doc.insert("id".into(), Value::String(id.to_string()));
        }
        let stamp = Value::String(self.created_at.to_rfc3339());
        doc.insert("createdAt".into(), stamp.clone());
        doc.insert("updatedAt".into(), stamp);
        doc
    }
}

/// Five people created on consecutive days; three names contain "jo".
pub fn people() -> Vec<Map<String, Value>> {
    ["John", "Alice", "Joanna", "Bob", "Marjorie"]
        .iter()
        .enumerate()
        .map(|(day, name)| test_doc(name).created_day(day as i64).build())
        .collect()
}

/// Create a raw query builder.
pub fn raw_query() -> RawQuery {
    RawQuery::default()
}

/// Builder for untyped query objects as a client would send them.
#[derive(Debug, Clone, Default)]
pub struct RawQuery {
    filters: Map<String, Value>,
    options: Map<String, Value>,
    extra: Map<String, Value>,
}

impl RawQuery {
    /// Add `filters.<field> = {<op>: value}`.
    pub fn filter(mut self, field: &str, op: &str, value: Value) -> Self {
        let entry = self
            .filters
            .entry(field.to_string())
            .or_insert_with(|| json!({}));
        if let Some(ops) = entry.as_object_mut() {
            ops.insert(op.to_string(), value);
        }
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.options.insert("limit".into(), json!(limit));
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.options.insert("page".into(), json!(page));
        self
    }

    pub fn sort(mut self, field: &str, dir: &str) -> Self {
        self.options.insert("sortField".into(), json!(field));
        self.options.insert("sortDir".into(), json!(dir));
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.extra.insert("fields".into(), json!(fields));
        self
    }

    pub fn search(mut self, token: &str) -> Self {
        self.extra.insert("search".into(), json!(token));
        self
    }

    /// Any other top-level key.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Value {
        let mut raw = self.extra;
        if !self.filters.is_empty() {
            raw.insert("filters".into(), Value::Object(self.filters));
        }
        if !self.options.is_empty() {
            raw.insert("options".into(), Value::Object(self.options));
        }
        Value::Object(raw)
    }
}

/// Assertion helpers for envelope bodies.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert a success envelope with the given status.
    pub fn success(body: &Value, status: u16) {
        assert_eq!(body["success"], true, "expected success envelope: {body}");
        assert_eq!(body["status"], status, "unexpected status: {body}");
    }

    /// Assert a failure envelope with the given status and error code.
    pub fn failure(body: &Value, status: u16, code: &str) {
        assert_eq!(body["success"], false, "expected failure envelope: {body}");
        assert_eq!(body["status"], status, "unexpected status: {body}");
        assert_eq!(body["error"]["code"], code, "unexpected code: {body}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_builder() {
        let id = Uuid::now_v7();
        let doc = test_doc("Ann")
            .with_id(id)
            .with_field("age", json!(30))
            .created_day(2)
            .build();
        assert_eq!(doc["id"], json!(id.to_string()));
        assert_eq!(doc["age"], json!(30));
        assert_eq!(doc["createdAt"], json!("2024-01-03T00:00:00+00:00"));
    }

    #[test]
    fn people_fixture() {
        let people = people();
        assert_eq!(people.len(), 5);
        let jo = people
            .iter()
            .filter(|p| p["name"].as_str().unwrap().to_lowercase().contains("jo"))
            .count();
        assert_eq!(jo, 3);
    }

    #[test]
    fn raw_query_builder() {
        let raw = raw_query()
            .filter("name", "contains", json!("jo"))
            .limit(2)
            .sort("createdAt", "desc")
            .build();
        assert_eq!(
            raw,
            json!({
                "filters": {"name": {"contains": "jo"}},
                "options": {"limit": 2, "sortField": "createdAt", "sortDir": "desc"}
            })
        );
    }
}
