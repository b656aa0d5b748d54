use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::dto::ErrorResponse;
use crate::orchestrator::TurnError;
use crate::services::{AttachmentError, GatewayError};
use crate::storage::{BlobError, RepositoryError};

/// Error returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            ApiError::BadGateway(detail) => {
                tracing::error!("Provider failure: {}", detail);
                "Failed to get a reply from the language model provider".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: status.as_u16(),
            }),
        )
            .into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            RepositoryError::Conflict(msg) => ApiError::Conflict(msg),
            RepositoryError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Configuration(msg) => ApiError::Internal(msg),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::ChatNotFound(uid) => ApiError::NotFound(format!("Chat {} not found", uid)),
            TurnError::InvalidInput(msg) => ApiError::BadRequest(msg),
            TurnError::Repository(e) => e.into(),
            TurnError::Gateway(e) => e.into(),
        }
    }
}

impl From<AttachmentError> for ApiError {
    fn from(err: AttachmentError) -> Self {
        match err {
            AttachmentError::NotFound(what) => ApiError::NotFound(format!("File {} not found", what)),
            AttachmentError::InvalidInput(msg) => ApiError::BadRequest(msg),
            e @ AttachmentError::TooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
            AttachmentError::Blob(BlobError::InvalidKey(key)) => {
                ApiError::BadRequest(format!("invalid storage key '{}'", key))
            }
            AttachmentError::Blob(e) => ApiError::Internal(e.to_string()),
            AttachmentError::Repository(e) => e.into(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}
