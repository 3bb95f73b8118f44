use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::users::{password::HashError, repo::RepoError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("password hashing error: {0}")]
    Hashing(String),
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("store error: {0}")]
    Store(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn user_not_found() -> Self {
        Self::NotFound("user not found".into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Hashing(_) => "hashing_error",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Store(_) => "internal_error",
        }
    }
}

// Conflict wording depends on the operation, so callers map DuplicateKey themselves
// when they need a specific message.
impl From<RepoError> for ServiceError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::DuplicateKey(_) => Self::Conflict("username or email already exists".into()),
            RepoError::NotFound => Self::user_not_found(),
            RepoError::DeadlineExceeded => Self::DeadlineExceeded,
            RepoError::Store(e) => Self::Store(e.to_string()),
        }
    }
}

impl From<HashError> for ServiceError {
    fn from(e: HashError) -> Self {
        Self::Hashing(e.to_string())
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match &rejection {
            JsonRejection::JsonDataError(e) => format!("invalid JSON data: {}", e.body_text()),
            JsonRejection::JsonSyntaxError(e) => format!("invalid JSON syntax: {}", e.body_text()),
            JsonRejection::MissingJsonContentType(_) => {
                "missing Content-Type header, expected application/json".to_string()
            }
            other => other.body_text(),
        };
        Self::Validation(message)
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(format!("invalid path parameter: {}", rejection.body_text()))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::DeadlineExceeded => {
                warn!("store deadline exceeded");
                (StatusCode::GATEWAY_TIMEOUT, "request timed out".to_string())
            }
            Self::Hashing(msg) | Self::Store(msg) => {
                error!(error = %msg, kind = self.kind(), "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        (
            status,
            Json(json!({
                "error": {
                    "type": self.kind(),
                    "message": message
                }
            })),
        )
            .into_response()
    }
}
