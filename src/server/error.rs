//! Mapping of library errors onto HTTP responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::{ErrorKind, SheetmailError};

/// A failed request. Rendered as `{"success": false, "error": <kind>, "details": <message>}`.
#[derive(Debug)]
pub struct ApiError(pub SheetmailError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Transport | ErrorKind::Document => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SheetmailError> for ApiError {
    fn from(e: SheetmailError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SheetmailError::validation("body", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(SheetmailError::validation("query", rejection.body_text()))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self(SheetmailError::Transport(format!("worker task failed: {e}")))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }
        let body = json!({
            "success": false,
            "error": self.0.kind().as_str(),
            "details": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
