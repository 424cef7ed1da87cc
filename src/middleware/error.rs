//! Error response formatting
//!
//! Every [`AppError`] leaves the service as the same JSON body with a status
//! derived from its kind. Rate-limit errors also carry the retry headers the
//! storefront uses to back off.

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Human-readable message, safe to show to customers
    pub error: String,

    /// Machine-readable error code
    pub code: ErrorCode,

    /// Request ID for debugging and support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// RFC 3339 timestamp of the error
    pub timestamp: String,

    pub retryable: bool,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.user_message(),
            code: error.error_code(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: error.is_retryable(),
        }
    }

    pub fn internal_error(request_id: Option<String>) -> Self {
        Self {
            error: "An internal server error occurred. Please try again later.".to_string(),
            code: ErrorCode::InternalError,
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            retryable: false,
        }
    }
}

fn rate_limit_headers(retry_after: u64) -> [(HeaderName, HeaderValue); 3] {
    let reset_at = Utc::now().timestamp() + retry_after as i64;
    [
        (
            HeaderName::from_static("retry-after"),
            HeaderValue::from(retry_after),
        ),
        (
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from_static("0"),
        ),
        (
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from(reset_at),
        ),
    ]
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self.kind,
                context = ?self.context,
                request_id = ?self.request_id,
                status = status_code.as_u16(),
                "server error"
            );
        } else {
            tracing::warn!(
                code = ?self.error_code(),
                request_id = ?self.request_id,
                status = status_code.as_u16(),
                "client error"
            );
        }

        let body = Json(ErrorResponse::from_app_error(&self));
        match self.retry_after() {
            Some(retry_after) => {
                (status_code, rate_limit_headers(retry_after), body).into_response()
            }
            None => (status_code, body).into_response(),
        }
    }
}

/// Helper to extract request ID from request headers
pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
