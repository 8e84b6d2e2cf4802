//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bazaar_core::error::{DomainError, ErrorDetail};
use thiserror::Error;
use tracing::error;

use crate::response::ApiResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Unauthorized: {0}")]
    Unauthorized(ErrorDetail),

    #[error("Forbidden: {0}")]
    Forbidden(ErrorDetail),
}

impl AppError {
    pub fn unauthorized(code: &str, description: &str) -> Self {
        AppError::Unauthorized(ErrorDetail::new(code, description))
    }

    pub fn forbidden(code: &str, description: &str) -> Self {
        AppError::Forbidden(ErrorDetail::new(code, description))
    }

    fn parts(self) -> (StatusCode, String, Vec<ErrorDetail>) {
        match self {
            AppError::Unauthorized(d) => (StatusCode::UNAUTHORIZED, "Unauthorized".into(), vec![d]),
            AppError::Forbidden(d) => (StatusCode::FORBIDDEN, "Forbidden".into(), vec![d]),
            AppError::Domain(e) => match e {
                DomainError::Validation(details) => {
                    (StatusCode::BAD_REQUEST, "Validation failed".into(), details)
                }
                DomainError::NotFound(d) => (StatusCode::NOT_FOUND, d.description.clone(), vec![d]),
                DomainError::Conflict(d) => (StatusCode::CONFLICT, d.description.clone(), vec![d]),
                DomainError::Unauthorized(d) => {
                    (StatusCode::UNAUTHORIZED, d.description.clone(), vec![d])
                }
                DomainError::Forbidden(d) => (StatusCode::FORBIDDEN, d.description.clone(), vec![d]),
                DomainError::Failure(d) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, d.description.clone(), vec![d])
                }
                other @ (DomainError::Store(_) | DomainError::Unexpected(_)) => {
                    error!(error = %other, "Request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".into(),
                        Vec::new(),
                    )
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = self.parts();
        (status, Json(ApiResponse::failure(message, errors))).into_response()
    }
}
