//! Mapping pipeline errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use repurpose_common::RepurposeError;
use serde_json::json;
use tracing::error;

/// Handler error. Bad requests become 400; anything else is a 500 with the
/// error text in `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(pub RepurposeError);

impl From<RepurposeError> for ApiError {
    fn from(e: RepurposeError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RepurposeError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %self.0, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `Json` extractor whose rejections use the same `{"error": ...}` body as
/// every other failure.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
