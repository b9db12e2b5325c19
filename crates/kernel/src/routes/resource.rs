//! Generic CRUD routes for one entity collection.
//!
//! | Method | Path      | Use case                      |
//! |--------|-----------|-------------------------------|
//! | GET    | `/`       | query from the URL query      |
//! | POST   | `/query`  | query from a JSON body        |
//! | POST   | `/`       | create                        |
//! | GET    | `/{id}`   | get, optional `fields`        |
//! | PATCH  | `/{id}`   | update                        |
//! | DELETE | `/{id}`   | delete                        |

use axum::extract::rejection::JsonRejection;
use axum::extract::{OriginalUri, Path, RawQuery, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use crate::error::AppError;
use crate::models::{Contact, Entity, Form, Page, User};
use crate::query::raw_query_from_str;
use crate::repository::Repository;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::use_case::{self, RequestContext};

/// An entity served over HTTP.
pub trait Resource: Entity {
    fn repository(state: &AppState) -> &Repository<Self>;
}

impl Resource for User {
    fn repository(state: &AppState) -> &Repository<Self> {
        state.users()
    }
}

impl Resource for Page {
    fn repository(state: &AppState) -> &Repository<Self> {
        state.pages()
    }
}

impl Resource for Contact {
    fn repository(state: &AppState) -> &Repository<Self> {
        state.contacts()
    }
}

impl Resource for Form {
    fn repository(state: &AppState) -> &Repository<Self> {
        state.forms()
    }
}

/// Create the router for one collection, to be nested under its prefix.
pub fn router<E: Resource>() -> Router<AppState> {
    Router::new()
        .route("/", get(list::<E>).post(create::<E>))
        .route("/query", post(query::<E>))
        .route(
            "/{id}",
            get(get_one::<E>).patch(update::<E>).delete(remove::<E>),
        )
}

fn context(state: &AppState, uri: &OriginalUri) -> RequestContext {
    RequestContext::new(uri.path(), state.expose_trace())
}

/// Malformed body in envelope form.
fn invalid_body(ctx: &RequestContext, rejection: JsonRejection) -> Response {
    let err = AppError::invalid_json(rejection.body_text());
    ApiResponse::<()>::failure(&err, ctx.instance.clone(), ctx.expose_trace).into_response()
}

fn raw_query(query: Option<String>) -> Value {
    raw_query_from_str(query.as_deref().unwrap_or_default())
}

async fn list<E: Resource>(
    State(state): State<AppState>,
    uri: OriginalUri,
    RawQuery(query): RawQuery,
) -> Response {
    let ctx = context(&state, &uri);
    use_case::query(E::repository(&state), &ctx, raw_query(query))
        .await
        .into_response()
}

async fn query<E: Resource>(
    State(state): State<AppState>,
    uri: OriginalUri,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let ctx = context(&state, &uri);
    match body {
        Ok(Json(raw)) => use_case::query(E::repository(&state), &ctx, raw)
            .await
            .into_response(),
        Err(rejection) => invalid_body(&ctx, rejection),
    }
}

async fn create<E: Resource>(
    State(state): State<AppState>,
    uri: OriginalUri,
    body: Result<Json<E::Create>, JsonRejection>,
) -> Response {
    let ctx = context(&state, &uri);
    match body {
        Ok(Json(input)) => use_case::create(E::repository(&state), &ctx, input)
            .await
            .into_response(),
        Err(rejection) => invalid_body(&ctx, rejection),
    }
}

async fn get_one<E: Resource>(
    State(state): State<AppState>,
    uri: OriginalUri,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let ctx = context(&state, &uri);
    use_case::get(E::repository(&state), &ctx, id, raw_query(query))
        .await
        .into_response()
}

async fn update<E: Resource>(
    State(state): State<AppState>,
    uri: OriginalUri,
    Path(id): Path<String>,
    body: Result<Json<E::Update>, JsonRejection>,
) -> Response {
    let ctx = context(&state, &uri);
    match body {
        Ok(Json(input)) => use_case::update(E::repository(&state), &ctx, id, input)
            .await
            .into_response(),
        Err(rejection) => invalid_body(&ctx, rejection),
    }
}

async fn remove<E: Resource>(
    State(state): State<AppState>,
    uri: OriginalUri,
    Path(id): Path<String>,
) -> Response {
    let ctx = context(&state, &uri);
    use_case::delete(E::repository(&state), &ctx, id)
        .await
        .into_response()
}
