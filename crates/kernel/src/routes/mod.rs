//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod resource;

use axum::extract::OriginalUri;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Router, extract::State};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{Contact, Entity, Form, Page, User};
use crate::response::ApiResponse;
use crate::state::AppState;

/// API version banner.
#[derive(Debug, Serialize)]
struct Banner {
    name: &'static str,
    version: &'static str,
    collections: [&'static str; 4],
}

async fn banner() -> ApiResponse<Banner> {
    ApiResponse::ok(
        Banner {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            collections: [
                User::COLLECTION,
                Page::COLLECTION,
                Contact::COLLECTION,
                Form::COLLECTION,
            ],
        },
        "API v1",
    )
}

/// Unknown route, in envelope form.
async fn not_found(State(state): State<AppState>, method: Method, uri: OriginalUri) -> Response {
    let err = AppError::not_found(format!("Route not found: {method} {}", uri.path()));
    ApiResponse::<()>::failure(&err, Some(uri.path().to_string()), state.expose_trace())
        .into_response()
}

/// Every route, with the metrics middleware applied.
///
/// Transport layers (CORS, tracing) are added by the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .route("/api/v1", get(banner))
        .nest(
            &format!("/api/{}", User::COLLECTION),
            resource::router::<User>(),
        )
        .nest(
            &format!("/api/{}", Page::COLLECTION),
            resource::router::<Page>(),
        )
        .nest(
            &format!("/api/{}", Contact::COLLECTION),
            resource::router::<Contact>(),
        )
        .nest(
            &format!("/api/{}", Form::COLLECTION),
            resource::router::<Form>(),
        )
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::track_metrics,
        ))
        .with_state(state)
}
