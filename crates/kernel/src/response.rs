//! Uniform result envelope.
//!
//! Every operation answers with the same discriminated shape:
//!
//! ```json
//! {"success": true,  "data": ..., "message": "...", "status": 200, "meta": {...}}
//! {"success": false, "error": {"code": "...", "detail": "...", "timestamp": "..."},
//!  "message": "...", "status": 404}
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::query::{QueryParams, QueryResult, SortDirection};

/// Pagination metadata for list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub filter_count: u64,
    pub page: u32,
    pub limit: u32,
    pub sort_field: Option<String>,
    pub sort_dir: SortDirection,
}

impl PageMeta {
    /// Metadata for a page of `result` fetched with `params`.
    pub fn new<T>(params: &QueryParams, result: &QueryResult<T>) -> Self {
        Self {
            total: result.total_count,
            filter_count: result.filter_count,
            page: params.page(),
            limit: params.limit(),
            sort_field: params.options.sort_field.clone(),
            sort_dir: params.sort_dir(),
        }
    }
}

/// Error block of a failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Reference page describing an HTTP status.
pub fn status_detail(status: StatusCode) -> String {
    format!(
        "https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/{}",
        status.as_u16()
    )
}

/// Success or failure envelope.
#[derive(Debug, Clone)]
pub enum ApiResponse<T> {
    Success {
        data: T,
        message: String,
        status: StatusCode,
        meta: Option<PageMeta>,
    },
    Failure {
        error: ErrorDetail,
        message: String,
        status: StatusCode,
    },
}

impl<T> ApiResponse<T> {
    /// 200 success.
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self::Success {
            data,
            message: message.into(),
            status: StatusCode::OK,
            meta: None,
        }
    }

    /// 201 success.
    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self::Success {
            data,
            message: message.into(),
            status: StatusCode::CREATED,
            meta: None,
        }
    }

    /// Attach pagination metadata; no effect on failures.
    pub fn with_meta(mut self, page_meta: PageMeta) -> Self {
        if let Self::Success { meta, .. } = &mut self {
            *meta = Some(page_meta);
        }
        self
    }

    /// Failure envelope for `err`.
    ///
    /// `instance` names the request path; the error's debug rendering is
    /// attached as `trace` only when `expose_trace` is set.
    pub fn failure(err: &AppError, instance: Option<String>, expose_trace: bool) -> Self {
        let status = err.status();
        Self::Failure {
            error: ErrorDetail {
                code: err.code().to_string(),
                detail: status_detail(status),
                timestamp: Utc::now(),
                instance,
                trace: expose_trace.then(|| format!("{err:?}")),
            },
            message: err.to_string(),
            status,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success { status, .. } | Self::Failure { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Payload of a success envelope.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }
}

impl<T: Serialize> Serialize for ApiResponse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success {
                data,
                message,
                status,
                meta,
            } => {
                let len = if meta.is_some() { 5 } else { 4 };
                let mut s = serializer.serialize_struct("ApiResponse", len)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("data", data)?;
                s.serialize_field("message", message)?;
                s.serialize_field("status", &status.as_u16())?;
                if let Some(meta) = meta {
                    s.serialize_field("meta", meta)?;
                }
                s.end()
            }
            Self::Failure {
                error,
                message,
                status,
            } => {
                let mut s = serializer.serialize_struct("ApiResponse", 4)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("error", error)?;
                s.serialize_field("message", message)?;
                s.serialize_field("status", &status.as_u16())?;
                s.end()
            }
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::created(json!({"id": "1"}), "Created")).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], 201);
        assert_eq!(body["data"]["id"], "1");
        assert!(body.get("meta").is_none());
    }

    #[test]
    fn meta_is_reported_for_lists() {
        let mut params = QueryParams::default();
        params.options.limit = Some(2);
        params.options.sort_field = Some("createdAt".into());
        params.options.sort_dir = Some(SortDirection::Desc);
        let result = QueryResult {
            items: vec![1, 2],
            total_count: 5,
            filter_count: 3,
        };
        let meta = PageMeta::new(&params, &result);
        let body = serde_json::to_value(ApiResponse::ok(result.items, "ok").with_meta(meta)).unwrap();
        assert_eq!(
            body["meta"],
            json!({
                "total": 5,
                "filterCount": 3,
                "page": 1,
                "limit": 2,
                "sortField": "createdAt",
                "sortDir": "desc"
            })
        );
    }

    #[test]
    fn failure_envelope_shape() {
        let err = AppError::not_found("User not found");
        let response: ApiResponse<()> =
            ApiResponse::failure(&err, Some("/api/users/1".into()), false);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], 404);
        assert_eq!(body["message"], "User not found");
        assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");
        assert_eq!(body["error"]["instance"], "/api/users/1");
        assert_eq!(
            body["error"]["detail"],
            "https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/404"
        );
        assert!(body["error"].get("trace").is_none());
        assert!(body.get("data").is_none());
    }

    #[test]
    fn trace_only_when_exposed() {
        let err = AppError::Internal(anyhow::anyhow!("pool closed"));
        let hidden: ApiResponse<()> = ApiResponse::failure(&err, None, false);
        let shown: ApiResponse<()> = ApiResponse::failure(&err, None, true);
        let hidden = serde_json::to_value(&hidden).unwrap();
        let shown = serde_json::to_value(&shown).unwrap();
        assert!(hidden["error"].get("trace").is_none());
        assert!(shown["error"]["trace"].as_str().unwrap().contains("pool closed"));
        assert!(!hidden["message"].as_str().unwrap().contains("pool closed"));
    }
}
