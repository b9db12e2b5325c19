#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTTP API tests against the real router over in-memory storage.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::json;

use quarry_kernel::config::Config;
use quarry_test_utils::assert;

mod common;
use common::{TestApp, body_bytes};

async fn create_user(app: &TestApp, name: &str, email: &str) -> String {
    let (status, body) = app
        .send(
            Method::POST,
            "/api/users",
            json!({"name": name, "email": email, "password": "correct horse"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_memory_storage() {
    let app = TestApp::new();
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn banner_lists_collections() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/v1").await;
    assert_eq!(status, StatusCode::OK);
    assert::success(&body, 200);
    assert_eq!(
        body["data"]["collections"],
        json!(["users", "pages", "contacts", "forms"])
    );
}

#[tokio::test]
async fn unknown_route_is_an_envelope() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/widgets").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert::failure(&body, 404, "RESOURCE_NOT_FOUND");
    assert_eq!(body["message"], "Route not found: GET /api/widgets");
    assert_eq!(body["error"]["instance"], "/api/widgets");
}

#[tokio::test]
async fn create_user_hides_the_password_hash() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/users",
            json!({"name": " Ann ", "email": "Ann@Example.COM", "password": "correct horse"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert::success(&body, 201);
    assert_eq!(body["message"], "User created successfully");
    let data = &body["data"];
    assert_eq!(data["name"], "Ann");
    assert_eq!(data["email"], "ann@example.com");
    assert_eq!(data["role"], "user");
    assert_eq!(data["isActive"], true);
    assert!(data.get("passwordHash").is_none(), "{data}");
    assert!(data.get("password").is_none(), "{data}");
    assert::has_key(data, "createdAt");

    let id = data["id"].as_str().unwrap();
    let (_, body) = app.get(&format!("/api/users/{id}")).await;
    assert!(body["data"].get("passwordHash").is_none(), "{body}");
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = TestApp::new();
    create_user(&app, "Ann", "ann@example.com").await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/users",
            json!({"name": "Other", "email": "ANN@example.com", "password": "correct horse"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert::failure(&body, 409, "CONFLICT");
    assert_eq!(body["message"], "Duplicate value for unique field: email");
}

#[tokio::test]
async fn invalid_input_is_rejected_before_storage() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/users",
            json!({"name": "Ann", "email": "ann@example.com", "password": "short"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert::failure(&body, 422, "VALIDATION_ERROR");
    assert_eq!(app.state.users().count(&Default::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_json_body() {
    let app = TestApp::new();
    let (status, body) = app
        .send_raw(Method::POST, "/api/contacts", "{\"name\": ")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert::failure(&body, 400, "INVALID_JSON_BODY");
    assert_eq!(body["error"]["instance"], "/api/contacts");
}

#[tokio::test]
async fn list_with_url_filters_and_meta() {
    let app = TestApp::new();
    for (name, email) in [
        ("John", "john@example.com"),
        ("Alice", "alice@example.com"),
        ("Joanna", "joanna@example.com"),
    ] {
        create_user(&app, name, email).await;
    }

    let (status, body) = app
        .get("/api/users?filters[name][contains]=JO&limit=1&sortField=name&sortDir=asc")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert::success(&body, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["name"], "Joanna");
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["meta"]["filterCount"], 2);
    assert_eq!(body["meta"]["page"], 1);
    assert_eq!(body["meta"]["limit"], 1);
    assert_eq!(body["meta"]["sortField"], "name");
    assert_eq!(body["meta"]["sortDir"], "asc");
}

#[tokio::test]
async fn search_and_projection_over_the_url() {
    let app = TestApp::new();
    create_user(&app, "John", "john@example.com").await;
    create_user(&app, "Alice", "alice@example.com").await;

    let (status, body) = app.get("/api/users?search=ALICE&fields=email").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    let mut keys: Vec<&str> = items[0]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["email", "id"]);
}

#[tokio::test]
async fn unknown_filter_field_is_named() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/users?filters[salary][gt]=10").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert::failure(&body, 422, "UNKNOWN_FIELD");
    assert!(body["message"].as_str().unwrap().contains("salary"), "{body}");
}

#[tokio::test]
async fn malformed_id_is_a_bad_request() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/users/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert::failure(&body, 400, "INVALID_ID_FORMAT");

    let (status, _) = app.delete("/api/users/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn strict_collections_reject_unknown_parameters() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/pages?colour=red").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert::failure(&body, 422, "UNKNOWN_PARAMETER");

    // Users are lenient: unknown keys are ignored.
    let (status, _) = app.get("/api/users?colour=red").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn page_lifecycle() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/pages",
            json!({"title": "About", "slug": "about-us", "path": "/about"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "DRAFT");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/pages/{id}"),
            json!({"status": "PUBLISHED", "title": "About us"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "PUBLISHED");
    assert_eq!(body["data"]["slug"], "about-us");

    let (_, body) = app.get(&format!("/api/pages/{id}?fields=title")).await;
    assert_eq!(body["data"], json!({"title": "About us", "id": id}));

    let (status, body) = app.delete(&format!("/api/pages/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], true);

    let (status, body) = app.delete(&format!("/api/pages/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert::failure(&body, 404, "RESOURCE_NOT_FOUND");
    assert_eq!(body["message"], "Page not found");
}

#[tokio::test]
async fn duplicate_slug_conflicts() {
    let app = TestApp::new();
    let page = json!({"title": "About", "slug": "about", "path": "/about"});
    let (status, _) = app.send(Method::POST, "/api/pages", page).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/pages",
            json!({"title": "Other", "slug": "about", "path": "/other"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Duplicate value for unique field: slug");
}

#[tokio::test]
async fn query_endpoint_takes_a_json_body() {
    let app = TestApp::new();
    for name in ["Acme", "Globex", "Initech"] {
        let (status, _) = app
            .send(Method::POST, "/api/contacts", json!({"name": name}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .send(
            Method::POST,
            "/api/contacts/query",
            json!({
                "filters": {"name": {"in": ["Acme", "Initech"]}},
                "options": {"limit": 5, "sortField": "name", "sortDir": "desc"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Initech", "Acme"]);
    assert_eq!(body["meta"]["filterCount"], 2);
    assert_eq!(body["meta"]["total"], 3);
}

#[tokio::test]
async fn missing_contact_update_is_not_found() {
    let app = TestApp::new();
    let id = uuid::Uuid::now_v7();
    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/contacts/{id}"),
            json!({"name": "Nobody"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Contact not found");
}

#[tokio::test]
async fn metrics_are_exposed() {
    let app = TestApp::new();
    app.get("/health").await;
    app.get("/api/forms").await;

    let response = app
        .request(Request::get("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("http_requests_total"), "{text}");
    assert!(text.contains("repository_operations_total"), "{text}");
}

#[tokio::test]
async fn traces_are_hidden_in_production() {
    let dev = TestApp::new();
    let (_, body) = dev.get("/api/users/not-a-uuid").await;
    assert::has_key(&body["error"], "trace");

    let prod = TestApp::with_config(Config {
        app_env: "production".into(),
        ..Config::default()
    });
    let (_, body) = prod.get("/api/users/not-a-uuid").await;
    assert!(body["error"].get("trace").is_none(), "{body}");
    assert::has_key(&body["error"], "timestamp");
}
