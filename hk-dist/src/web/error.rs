//! API error type rendered as plain text

use crate::database::DatabaseError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hk_core::{HkError, ReleaseError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(error: impl std::fmt::Display) -> Self {
        Self::Internal(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "Request failed");
        }
        (status, format!("{}\n", self)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::Duplicate { .. } => Self::Conflict("conflict".to_string()),
            DatabaseError::NotFound { .. } => Self::NotFound,
            other => Self::internal(other),
        }
    }
}

impl From<HkError> for ApiError {
    fn from(error: HkError) -> Self {
        let bad_path = matches!(
            error,
            HkError::Release(
                ReleaseError::InvalidIdent { .. }
                    | ReleaseError::InvalidVersion { .. }
                    | ReleaseError::InvalidPlatform { .. }
            )
        );
        if bad_path {
            Self::BadRequest("bad characters in path".to_string())
        } else if error.is_not_found() {
            Self::NotFound
        } else {
            Self::internal(error)
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
