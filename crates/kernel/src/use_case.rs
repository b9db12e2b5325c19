//! Use-case layer.
//!
//! [`run`] wraps a core `execute` step with a synchronous `before` check,
//! outcome logging and conversion of every [`AppError`] into the failure
//! envelope. The generic CRUD use cases below are all built on it.

use std::future::Future;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Entity, Validate};
use crate::repository::Repository;
use crate::response::{ApiResponse, PageMeta};
use crate::store::Document;

/// Per-request facts the failure envelope needs.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Request path, reported as the error `instance`.
    pub instance: Option<String>,
    /// Attach error traces (non-production only).
    pub expose_trace: bool,
}

impl RequestContext {
    pub fn new(instance: impl Into<String>, expose_trace: bool) -> Self {
        Self {
            instance: Some(instance.into()),
            expose_trace,
        }
    }
}

/// Run one use case.
///
/// Inputs are never logged; they may carry credentials.
pub async fn run<I, O, B, F, Fut>(
    name: &'static str,
    ctx: &RequestContext,
    input: I,
    before: B,
    execute: F,
) -> ApiResponse<O>
where
    B: FnOnce(&I) -> AppResult<()>,
    F: FnOnce(I) -> Fut,
    Fut: Future<Output = AppResult<ApiResponse<O>>>,
{
    debug!(use_case = name, "executing");
    let result = match before(&input) {
        Ok(()) => execute(input).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(response) => {
            debug!(use_case = name, status = response.status().as_u16(), "completed");
            response
        }
        Err(e) => {
            match &e {
                AppError::Internal(source) => {
                    warn!(use_case = name, code = e.code(), error = ?source, "failed");
                }
                _ => warn!(use_case = name, code = e.code(), error = %e, "failed"),
            }
            ApiResponse::failure(&e, ctx.instance.clone(), ctx.expose_trace)
        }
    }
}

/// Reject ids that are not UUIDs before touching storage.
pub fn check_id(id: &str) -> AppResult<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| AppError::invalid_id("id", id))
}

pub async fn create<E: Entity>(
    repo: &Repository<E>,
    ctx: &RequestContext,
    input: E::Create,
) -> ApiResponse<E> {
    run("create", ctx, input, |input| input.validate(), |input| async move {
        let entity = repo.create(input).await?;
        Ok(ApiResponse::created(
            entity,
            format!("{} created successfully", E::LABEL),
        ))
    })
    .await
}

/// Fetch one document; `raw` may carry a `fields` projection.
pub async fn get<E: Entity>(
    repo: &Repository<E>,
    ctx: &RequestContext,
    id: String,
    raw: Value,
) -> ApiResponse<Document> {
    run(
        "get",
        ctx,
        (id, raw),
        |(id, _)| check_id(id),
        |(id, raw)| async move {
            let params = repo.schema().validate(&raw)?;
            let doc = repo.find_by_id(&id, &params.fields).await?;
            Ok(ApiResponse::ok(
                doc,
                format!("{} retrieved successfully", E::LABEL),
            ))
        },
    )
    .await
}

pub async fn update<E: Entity>(
    repo: &Repository<E>,
    ctx: &RequestContext,
    id: String,
    input: E::Update,
) -> ApiResponse<E> {
    run(
        "update",
        ctx,
        (id, input),
        |(id, input)| {
            check_id(id)?;
            input.validate()
        },
        |(id, input)| async move {
            let entity = repo.update(&id, input).await?;
            Ok(ApiResponse::ok(
                entity,
                format!("{} updated successfully", E::LABEL),
            ))
        },
    )
    .await
}

/// Delete by id; a missing id is a not-found failure.
pub async fn delete<E: Entity>(
    repo: &Repository<E>,
    ctx: &RequestContext,
    id: String,
) -> ApiResponse<bool> {
    run(
        "delete",
        ctx,
        id,
        |id| check_id(id),
        |id| async move {
            if !repo.delete(&id).await? {
                return Err(AppError::not_found(format!("{} not found", E::LABEL)));
            }
            Ok(ApiResponse::ok(
                true,
                format!("{} deleted successfully", E::LABEL),
            ))
        },
    )
    .await
}

/// Validate a raw query object and return one page with its metadata.
pub async fn query<E: Entity>(
    repo: &Repository<E>,
    ctx: &RequestContext,
    raw: Value,
) -> ApiResponse<Vec<Document>> {
    run(
        "query",
        ctx,
        raw,
        |_| Ok(()),
        |raw| async move {
            let params = repo.schema().validate(&raw)?;
            let result = repo.query(&params).await?;
            let meta = PageMeta::new(&params, &result);
            Ok(ApiResponse::ok(
                result.items,
                format!("{} list retrieved successfully", E::LABEL),
            )
            .with_meta(meta))
        },
    )
    .await
}
