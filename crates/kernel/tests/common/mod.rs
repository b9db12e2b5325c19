#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Tests drive the REAL kernel router and repositories over in-memory
//! collections. Every [`TestApp`] owns fresh state, so tests never share
//! documents.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use tower::ServiceExt;

use quarry_kernel::config::Config;
use quarry_kernel::metrics::Metrics;
use quarry_kernel::models::Entity;
use quarry_kernel::query::QuerySchema;
use quarry_kernel::repository::Repository;
use quarry_kernel::routes;
use quarry_kernel::state::AppState;
use quarry_kernel::store::{CollectionSchema, DocumentStore, MemoryCollection};

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let state = AppState::in_memory(config).expect("Failed to initialize AppState");
        let router = routes::app(state.clone());
        Self { router, state }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// GET a path and decode the JSON body.
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .request(Request::get(uri).body(Body::empty()).unwrap())
            .await;
        split(response).await
    }

    /// Send a JSON body.
    pub async fn send(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send_raw(method, uri, &body.to_string()).await
    }

    /// Send a body verbatim with a JSON content type.
    pub async fn send_raw(&self, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        split(self.request(request).await).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .request(
                Request::builder()
                    .method(Method::DELETE)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        split(response).await
    }
}

/// Read the full body as bytes.
pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes()
        .to_vec()
}

async fn split(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body_bytes(response).await;
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Repository over a fresh in-memory collection with a custom query schema.
pub fn repository<E: Entity>(schema: QuerySchema) -> (Repository<E>, Arc<MemoryCollection>) {
    let store = Arc::new(MemoryCollection::new(
        E::COLLECTION,
        CollectionSchema::default(),
    ));
    let repo = Repository::new(
        store.clone() as Arc<dyn DocumentStore>,
        Arc::new(schema),
        Arc::new(Metrics::new()),
    );
    (repo, store)
}

/// Insert seed documents directly into a collection.
pub async fn seed(store: &MemoryCollection, docs: Vec<Map<String, Value>>) -> Vec<String> {
    let mut ids = Vec::with_capacity(docs.len());
    for doc in docs {
        let stored = store.create(doc).await.expect("Failed to seed document");
        ids.push(stored["id"].as_str().unwrap().to_string());
    }
    ids
}
