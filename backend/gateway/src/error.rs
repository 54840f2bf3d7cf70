//! Mapping from engine errors to `{success: false, error}` responses.
//!
//! Client errors carry their message. Everything else is logged with its cause
//! and answered with the endpoint's generic failure text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use chatitp_core::ChatError;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound(String),
    /// Server-side failure; the cause has been logged, only `public` is returned.
    Internal { public: &'static str },
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    /// Classify an engine error, logging server-side causes.
    pub fn from_chat(err: ChatError, public: &'static str) -> Self {
        match err {
            ChatError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            ChatError::SessionNotFound { .. } => ApiError::NotFound("Session not found.".into()),
            other => {
                error!(error = %other, "{}", public);
                ApiError::Internal { public }
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Unauthorized => "Unauthorized",
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg,
            ApiError::Internal { public } => public,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "error": self.message() }));
        (self.status(), body).into_response()
    }
}
