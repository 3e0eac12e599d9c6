//! HTTP error mapping. Mirrors the teacher's `error.rs`: one enum, one
//! `IntoResponse` impl, `CoreError` translated per spec.md §7's
//! propagation table rather than a blanket 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use commitly_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing authorization header")]
    AuthMissing,
    #[error("invalid or expired token")]
    AuthInvalid,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::AuthMissing | ApiError::AuthInvalid => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Core(CoreError::NotFound(_)) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Core(CoreError::ExtractionInvalid(_)) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Core(CoreError::UserMissing(_)) => {
                tracing::error!(error = %self, "credit op referenced an unknown user");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            ApiError::Core(CoreError::CreditsExhausted(_)) => (StatusCode::OK, self.to_string()),
            ApiError::Core(CoreError::LockHeld) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Core(_) => {
                tracing::error!(error = %self, "unhandled core error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
